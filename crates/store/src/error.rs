/// Failure reported by an [`ObjectStore`](crate::ObjectStore) backend.
///
/// A missing object is not an error; backends return `Ok(None)` for it.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{operation} {key} failed with status {status}: {body}")]
    Status {
        operation: &'static str,
        key: String,
        status: u16,
        body: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid store configuration: {0}")]
    Config(String),

    #[error("invalid object key: {0:?}")]
    InvalidKey(String),

    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    /// True when the failure came from the network layer rather than the
    /// backend's answer.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
