//! Binary persistence collaborators

use async_trait::async_trait;
use dashmap::DashMap;
use error_stack::Report;
use tracing::debug;

use super::data_url::{self, DataUrl};
use crate::constants::MEMORY_BLOB_SCHEME;
use crate::error::{Error, Result};

/// Persists file payloads extracted from inline data URLs
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist `bytes` under `id`, returning the URL that now references them
    async fn store(&self, id: &str, mime_type: &str, bytes: Vec<u8>) -> Result<String>;

    /// Load the bytes previously stored under `id`
    async fn retrieve(&self, id: &str) -> Result<Vec<u8>>;
}

/// Keeps payloads inline: the returned URL is the payload itself
///
/// Identifiers handed to `retrieve` are the data URLs `store` returned.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataUrlBlobStore;

#[async_trait]
impl BlobStore for DataUrlBlobStore {
    async fn store(&self, id: &str, mime_type: &str, bytes: Vec<u8>) -> Result<String> {
        debug!(id, mime_type, size = bytes.len(), "Encoding blob inline");
        Ok(data_url::encode(mime_type, &bytes))
    }

    async fn retrieve(&self, id: &str) -> Result<Vec<u8>> {
        DataUrl::parse(id)
            .map(|url| url.bytes)
            .map_err(|e| e.change_context(Error::storage_failed("retrieve", "inline", "not a data URL")))
    }
}

/// Process-local blob store returning `memory://<id>` URLs
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, (String, Vec<u8>)>,
}

impl MemoryBlobStore {
    /// Create an empty store
    pub fn new() -> Self { Self::default() }

    /// Number of stored blobs
    pub fn len(&self) -> usize { self.blobs.len() }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool { self.blobs.is_empty() }

    /// Mime type recorded for `id`
    pub fn mime_type(&self, id: &str) -> Option<String> {
        self.blobs.get(id).map(|blob| blob.0.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn store(&self, id: &str, mime_type: &str, bytes: Vec<u8>) -> Result<String> {
        debug!(id, mime_type, size = bytes.len(), "Storing blob in memory");
        self.blobs
            .insert(id.to_string(), (mime_type.to_string(), bytes));
        Ok(format!("{MEMORY_BLOB_SCHEME}{id}"))
    }

    async fn retrieve(&self, id: &str) -> Result<Vec<u8>> {
        let id = id.strip_prefix(MEMORY_BLOB_SCHEME).unwrap_or(id);
        self.blobs
            .get(id)
            .map(|blob| blob.1.clone())
            .ok_or_else(|| Report::new(Error::storage_failed("retrieve", id, "no such blob")))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, reason = "stores in these tests accept every payload")]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_data_url_store_round_trip() {
        let store = DataUrlBlobStore;
        let url = store
            .store("ignored", "text/plain", b"hi".to_vec())
            .await
            .expect("inline store");
        assert_eq!(url, "data:text/plain;base64,aGk=");
        assert_eq!(store.retrieve(&url).await.expect("decodes"), b"hi".to_vec());
        assert!(store.retrieve("https://example.com").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryBlobStore::new();
        let url = store.store("abc", "image/png", vec![1, 2, 3]).await.expect("memory store");
        assert_eq!(url, "memory://abc");
        assert_eq!(store.retrieve("abc").await.expect("by id"), vec![1, 2, 3]);
        assert_eq!(store.retrieve("memory://abc").await.expect("by url"), vec![1, 2, 3]);
        assert_eq!(store.mime_type("abc").as_deref(), Some("image/png"));
        assert!(matches!(
            store.retrieve("missing").await.map_err(|e| e.current_context().clone()),
            Err(Error::FileStorage(_))
        ));
    }
}
