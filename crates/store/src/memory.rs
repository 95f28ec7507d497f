use std::collections::HashMap;

use {async_trait::async_trait, tokio::sync::RwLock};

use crate::{ObjectStore, Result};

/// An object held by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

/// In-process store backed by a `HashMap`. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full object (body and content type) under `key`.
    pub async fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    /// Stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.read().await.get(key).map(|o| o.body.clone()))
    }

    async fn put(&self, key: &str, value: Vec<u8>, content_type: Option<&str>) -> Result<()> {
        self.objects.write().await.insert(key.to_string(), StoredObject {
            body: value,
            content_type: content_type.map(str::to_string),
        });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }
}
