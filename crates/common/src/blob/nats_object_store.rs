use crate::blob::BlobStore;
use anyhow::{Context, Result};
use async_nats::jetstream;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};

/// BlobStore backed by a NATS JetStream object store bucket
pub struct NatsObjectBlobStore {
    store: jetstream::object_store::ObjectStore,
    key_prefix: String,
}

impl NatsObjectBlobStore {
    /// Connect to `nats_url` and open (or create) `bucket_name`
    pub async fn connect(nats_url: &str, bucket_name: &str) -> Result<Self> {
        let client = async_nats::connect(nats_url)
            .await
            .with_context(|| format!("failed to connect to NATS at {}", nats_url))?;
        let jetstream = jetstream::new(client);
        Self::new(&jetstream, bucket_name).await
    }

    pub async fn new(jetstream: &jetstream::Context, bucket_name: &str) -> Result<Self> {
        debug!(bucket = %bucket_name, "initializing attachment bucket");

        let store = match jetstream.get_object_store(bucket_name).await {
            Ok(store) => store,
            Err(_) => {
                debug!(bucket = %bucket_name, "creating attachment bucket");
                jetstream
                    .create_object_store(jetstream::object_store::Config {
                        bucket: bucket_name.to_string(),
                        ..Default::default()
                    })
                    .await
                    .context("failed to create object store bucket")?
            }
        };

        Ok(Self {
            store,
            key_prefix: "attachments".to_string(),
        })
    }
}

#[async_trait]
impl BlobStore for NatsObjectBlobStore {
    #[instrument(skip(self, content), fields(size = content.len()))]
    async fn put_blob(&self, content: Bytes) -> Result<String> {
        let key = format!("{}/{}", self.key_prefix, xid::new());
        let mut reader = &content[..];
        self.store
            .put(key.as_str(), &mut reader)
            .await
            .context("failed to upload object")?;
        debug!(key = %key, "stored blob");
        Ok(key)
    }

    async fn get_blob(&self, key: &str) -> Result<Bytes> {
        let mut object = self.store.get(key).await.context("failed to get object")?;

        let mut buf = Vec::new();
        object
            .read_to_end(&mut buf)
            .await
            .context("failed to read object content")?;

        Ok(Bytes::from(buf))
    }

    async fn delete_blob(&self, key: &str) -> Result<()> {
        self.store
            .delete(key)
            .await
            .context("failed to delete object")?;
        Ok(())
    }
}
