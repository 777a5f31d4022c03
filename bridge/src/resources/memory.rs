use async_trait::async_trait;
use dashmap::DashMap;

use super::ResourceProvider;
use super::directory::strip_embedded_prefix;
use crate::error::Result;

/// Map backed resource provider
///
/// Counts fetches per key so callers can observe how often a resource was
/// actually read.
#[derive(Debug, Default)]
pub struct MemoryResourceProvider {
    resources: DashMap<String, Vec<u8>>,
    fetches:   DashMap<String, usize>,
}

impl MemoryResourceProvider {
    /// Create an empty provider
    pub fn new() -> Self { Self::default() }

    /// Store `bytes` under `key`, replacing any previous resource
    pub fn insert(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.resources.insert(key.into(), bytes.into());
    }

    /// Store a JSON document under `key`
    pub fn insert_json(&self, key: impl Into<String>, value: &serde_json::Value) {
        self.insert(key, value.to_string());
    }

    /// Builder form of [`Self::insert_json`]
    #[must_use]
    pub fn with_json(self, key: impl Into<String>, value: &serde_json::Value) -> Self {
        self.insert_json(key, value);
        self
    }

    /// Number of `get` calls made for `key`
    pub fn fetch_count(&self, key: &str) -> usize {
        self.fetches.get(key).map_or(0, |count| *count)
    }
}

#[async_trait]
impl ResourceProvider for MemoryResourceProvider {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = strip_embedded_prefix(key);
        *self.fetches.entry(key.to_string()).or_insert(0) += 1;
        Ok(self.resources.get(key).map(|bytes| bytes.clone()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = strip_embedded_prefix(prefix);
        let mut keys: Vec<String> = self
            .resources
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
