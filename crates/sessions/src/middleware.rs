//! Session lifecycle around one update: derive key, load, expose, run the
//! rest of the chain, then save or delete.
//!
//! Requests that resolve to the same key are not coordinated. Two concurrent
//! updates from one conversation both load the same state and the one that
//! finishes last overwrites the other's changes.

use std::sync::Arc;

use {
    anyhow::Result,
    async_trait::async_trait,
    serde_json::Value,
    stashbot_chain::{AssignPolicy, Context, DEFAULT_SESSION_PROPERTY, Middleware, Next, SessionSlot},
    stashbot_store::ObjectStore,
    tracing::{debug, warn},
};

use crate::{
    codec::{JsonCodec, SessionCodec},
    key::{KeyFn, SessionKey, default_key},
    store::{DEFAULT_CONTENT_TYPE, SessionStore},
};

/// Every recognized middleware option with its default.
#[derive(Clone)]
pub struct SessionOptions {
    /// Context property the session is exposed under. Default `"session"`.
    pub property: String,
    /// Key derivation. Default `"{sender}:{chat}"`.
    pub key_fn: KeyFn,
    /// Default compact JSON.
    pub codec: Arc<dyn SessionCodec>,
    /// Default `"application/json"`.
    pub content_type: String,
    /// Default [`AssignPolicy::Replace`].
    pub assign: AssignPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            property: DEFAULT_SESSION_PROPERTY.into(),
            key_fn: Arc::new(default_key),
            codec: Arc::new(JsonCodec::new()),
            content_type: DEFAULT_CONTENT_TYPE.into(),
            assign: AssignPolicy::default(),
        }
    }
}

impl std::fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptions")
            .field("property", &self.property)
            .field("content_type", &self.content_type)
            .field("assign", &self.assign)
            .finish_non_exhaustive()
    }
}

impl SessionOptions {
    #[must_use]
    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = property.into();
        self
    }

    #[must_use]
    pub fn with_key_fn(
        mut self,
        key_fn: impl Fn(&Context) -> Option<SessionKey> + Send + Sync + 'static,
    ) -> Self {
        self.key_fn = Arc::new(key_fn);
        self
    }

    #[must_use]
    pub fn with_key_fn_arc(mut self, key_fn: KeyFn) -> Self {
        self.key_fn = key_fn;
        self
    }

    #[must_use]
    pub fn with_codec(mut self, codec: impl SessionCodec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    #[must_use]
    pub fn with_assign(mut self, assign: AssignPolicy) -> Self {
        self.assign = assign;
        self
    }
}

/// Loads the session of each update before the rest of the chain runs and
/// persists it afterwards.
///
/// If the downstream chain fails, the error is returned and the session is
/// not saved. If loading fails, downstream is not run at all.
pub struct SessionMiddleware {
    store: SessionStore,
    property: String,
    key_fn: KeyFn,
    assign: AssignPolicy,
}

impl std::fmt::Debug for SessionMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMiddleware")
            .field("store", &self.store)
            .field("property", &self.property)
            .field("assign", &self.assign)
            .finish_non_exhaustive()
    }
}

impl SessionMiddleware {
    pub fn new(store: Arc<dyn ObjectStore>, options: SessionOptions) -> Self {
        let SessionOptions {
            property,
            key_fn,
            codec,
            content_type,
            assign,
        } = options;
        Self {
            store: SessionStore::with_codec(store, codec, content_type),
            property,
            key_fn,
            assign,
        }
    }

    pub fn with_defaults(store: Arc<dyn ObjectStore>) -> Self {
        Self::new(store, SessionOptions::default())
    }

    /// The underlying session store, for loading or clearing sessions
    /// outside of a request.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    /// Session key for `ctx`, or `None` when the update is exempt. An empty
    /// derived key counts as no key.
    pub fn key_for(&self, ctx: &Context) -> Option<SessionKey> {
        (self.key_fn)(ctx).filter(|key| !key.is_empty())
    }

    /// Shareable handle for [`stashbot_chain::Chain::with_arc`].
    pub fn as_middleware(self) -> Arc<dyn Middleware> {
        Arc::new(self)
    }
}

#[async_trait]
impl Middleware for SessionMiddleware {
    fn name(&self) -> &str {
        "session"
    }

    async fn handle(&self, ctx: &mut Context, next: Next<'_>) -> Result<()> {
        let Some(key) = self.key_for(ctx) else {
            return next.run(ctx).await;
        };

        let session = self.store.load(&key).await?;
        let displaced = ctx.install_slot(&self.property, SessionSlot::new(session, self.assign));
        if displaced.is_some() {
            warn!(property = %self.property, "session property already installed, shadowing it");
        }

        let outcome = next.run(ctx).await;

        let slot = ctx.take_slot(&self.property);
        if let Some(outer) = displaced {
            ctx.install_slot(&self.property, outer);
        }

        if let Err(e) = outcome {
            debug!(key = %key, error = %e, "handler failed, session not saved");
            return Err(e);
        }

        match slot {
            Some(slot) => {
                let session: Value = slot.into_inner();
                self.store.save(&key, &session).await?;
            },
            None => {
                warn!(key = %key, property = %self.property, "session slot removed downstream, not saving");
            },
        }
        Ok(())
    }
}
