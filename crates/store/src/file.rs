//! Directory-backed store: one file per key.
//!
//! Keys are percent-encoded into file names so that separators like `:` or
//! `/` never escape the root. Writes go to a temporary sibling first and are
//! renamed into place, so a reader sees either the old record or the new one.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use {async_trait::async_trait, tracing::debug};

use crate::{ObjectStore, Result, StoreError};

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key == "." || key == ".." {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(urlencoding::encode(key).as_ref()))
    }
}

#[async_trait]
impl ObjectStore for FileStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>, _content_type: Option<&str>) -> Result<()> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.root).await?;

        let tmp = self
            .root
            .join(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &value).await?;

        // Session payloads can carry user data; keep them owner-only.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(path = %path.display(), bytes = value.len(), "wrote object");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
