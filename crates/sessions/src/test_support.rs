//! Instrumented object store for tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use {
    async_trait::async_trait,
    stashbot_store::{MemoryStore, ObjectStore, Result, StoreError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Nothing,
    Get,
    Put,
    Delete,
}

/// Memory-backed store counting calls, optionally failing one operation.
#[derive(Debug)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    fail_on: FailOn,
    gets: AtomicUsize,
    puts: AtomicUsize,
    deletes: AtomicUsize,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::failing(FailOn::Nothing)
    }

    pub fn failing(fail_on: FailOn) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_on,
            gets: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.gets() + self.puts() + self.deletes()
    }

    fn check(&self, op: FailOn) -> Result<()> {
        if self.fail_on == op {
            return Err(StoreError::Backend(format!("simulated {op:?} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check(FailOn::Get)?;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>, content_type: Option<&str>) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.check(FailOn::Put)?;
        self.inner.put(key, value, content_type).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.check(FailOn::Delete)?;
        self.inner.delete(key).await
    }
}
