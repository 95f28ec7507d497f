use {crate::codec::CodecError, stashbot_store::StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session store error: {0}")]
    Store(#[from] StoreError),

    #[error("stored session {key} is corrupt: {source}")]
    Deserialize {
        key: String,
        #[source]
        source: CodecError,
    },

    #[error("failed to serialize session {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: CodecError,
    },
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
