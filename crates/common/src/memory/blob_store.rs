use crate::blob::BlobStore;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory BlobStore. `fail_writes` simulates an unavailable store.
#[derive(Clone, Default)]
pub struct InMemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, Bytes>>>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put_blob(&self, content: Bytes) -> Result<String> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("blob store unavailable"));
        }
        let key = format!("attachments/{}", xid::new());
        self.blobs.write().await.insert(key.clone(), content);
        Ok(key)
    }

    async fn get_blob(&self, key: &str) -> Result<Bytes> {
        self.blobs
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("blob {} not found", key))
    }

    async fn delete_blob(&self, key: &str) -> Result<()> {
        self.blobs.write().await.remove(key);
        Ok(())
    }
}
