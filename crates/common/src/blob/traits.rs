use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Opaque-key byte storage for message attachments
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes and return the key they can be fetched with
    async fn put_blob(&self, content: Bytes) -> Result<String>;

    async fn get_blob(&self, key: &str) -> Result<Bytes>;

    async fn delete_blob(&self, key: &str) -> Result<()>;
}
