use std::{fmt, sync::Arc};

use {stashbot_chain::Context, stashbot_config::KeyScope};

/// Storage key of one conversation's session, e.g. `"1:2"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(pub String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key for a sender inside a chat: `"{sender}:{chat}"`.
    pub fn sender_chat(sender_id: i64, chat_id: i64) -> Self {
        Self(format!("{sender_id}:{chat_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for SessionKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Derives the session key of an update, or `None` when the update is not
/// subject to session handling.
pub type KeyFn = Arc<dyn Fn(&Context) -> Option<SessionKey> + Send + Sync>;

/// Default derivation: sender and chat both present → `"{from}:{chat}"`.
pub fn default_key(ctx: &Context) -> Option<SessionKey> {
    derive_key(KeyScope::SenderChat, ctx)
}

/// Derive a key according to `scope`.
pub fn derive_key(scope: KeyScope, ctx: &Context) -> Option<SessionKey> {
    match scope {
        KeyScope::SenderChat => match (&ctx.from, &ctx.chat) {
            (Some(from), Some(chat)) => Some(SessionKey::sender_chat(from.id, chat.id)),
            _ => None,
        },
        KeyScope::Sender => ctx.from.as_ref().map(|from| SessionKey(from.id.to_string())),
        KeyScope::Chat => ctx.chat.as_ref().map(|chat| SessionKey(chat.id.to_string())),
    }
}

/// Boxed key function for `scope`.
pub fn key_fn(scope: KeyScope) -> KeyFn {
    Arc::new(move |ctx| derive_key(scope, ctx))
}
