//! Build stores and middleware from a loaded [`StashbotConfig`].

use std::sync::Arc;

use {
    anyhow::Context as _,
    stashbot_chain::AssignPolicy,
    stashbot_config::{AssignMode, S3StoreConfig, SessionConfig, StashbotConfig, StoreConfig},
    stashbot_store::{FileStore, MemoryStore, ObjectStore, S3Config, S3Store},
    tracing::info,
};

use crate::{
    codec::JsonCodec,
    key::key_fn,
    middleware::{SessionMiddleware, SessionOptions},
};

/// Open the object store described by `config`.
pub fn open_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match config {
        StoreConfig::S3(s3) => Arc::new(S3Store::new(s3_config(s3)?)?),
        StoreConfig::File(file) => Arc::new(FileStore::new(&file.root)),
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
    };
    info!(backend = store.name(), "session store ready");
    Ok(store)
}

/// Explicit credentials win; otherwise they come from the `AWS_*`
/// environment. Region, endpoint and prefix from the config file override
/// the environment.
fn s3_config(s3: &S3StoreConfig) -> anyhow::Result<S3Config> {
    let mut config = match (&s3.access_key_id, &s3.secret_access_key) {
        (Some(id), Some(secret)) => S3Config::new(&s3.bucket, id, secret.clone()),
        _ => S3Config::from_env(&s3.bucket)
            .context("no credentials in config and none in the environment")?,
    };
    if let Some(region) = &s3.region {
        config.region = region.clone();
    }
    if let Some(endpoint) = &s3.endpoint {
        config.endpoint = Some(endpoint.clone());
    }
    if let Some(prefix) = &s3.key_prefix {
        config.key_prefix = Some(prefix.clone());
    }
    if s3.session_token.is_some() {
        config.session_token = s3.session_token.clone();
    }
    Ok(config)
}

fn assign_policy(mode: AssignMode) -> AssignPolicy {
    match mode {
        AssignMode::Replace => AssignPolicy::Replace,
        AssignMode::Merge => AssignPolicy::Merge,
    }
}

impl SessionOptions {
    pub fn from_config(config: &SessionConfig) -> Self {
        let codec = if config.pretty {
            JsonCodec::pretty()
        } else {
            JsonCodec::new()
        };
        Self::default()
            .with_property(config.property.clone())
            .with_content_type(config.content_type.clone())
            .with_assign(assign_policy(config.assign))
            .with_codec(codec)
            .with_key_fn_arc(key_fn(config.key_scope))
    }
}

impl SessionMiddleware {
    /// Validate `config`, open its store and build the middleware.
    pub fn from_config(config: &StashbotConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let store = open_store(&config.store)?;
        Ok(Self::new(store, SessionOptions::from_config(&config.session)))
    }
}
