//! Keyed object storage.
//!
//! Session records are opaque byte blobs addressed by a string key. Backends
//! implement [`ObjectStore`]; "not found" is a regular outcome (`Ok(None)`),
//! everything else that goes wrong is a [`StoreError`].

pub mod error;
pub mod file;
pub mod memory;
pub mod s3;

use async_trait::async_trait;

pub use {
    error::StoreError,
    file::FileStore,
    memory::{MemoryStore, StoredObject},
    s3::{S3Config, S3Store},
};

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Get/put/delete over a flat key space (an S3 bucket, a directory, a map).
///
/// Implementations must make each `put` and `delete` atomic per key. Retries,
/// if any, belong here and not in callers.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Backend identifier used in logs (e.g. "s3", "file").
    fn name(&self) -> &'static str;

    /// Fetch the object stored under `key`. `Ok(None)` when it does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous object.
    async fn put(&self, key: &str, value: Vec<u8>, content_type: Option<&str>) -> Result<()>;

    /// Remove the object under `key`. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;
}
