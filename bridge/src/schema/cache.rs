//! Keyed cache of fully expanded schemas
//!
//! Each key owns a slot that is populated at most once; concurrent misses for
//! the same key wait on the single load in flight. A failed load leaves the
//! slot empty so the next caller retries.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::debug;

use super::component::Schema;
use crate::config::CacheConfig;
use crate::error::Result;

/// A schema together with the moment it entered the cache
#[derive(Debug)]
struct CachedSchema {
    schema:    Arc<Schema>,
    cached_at: Instant,
}

type Slot = Arc<OnceCell<CachedSchema>>;

/// Expanded schemas keyed by schema identity
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: DashMap<String, Slot>,
    config:  CacheConfig,
}

impl SchemaCache {
    /// Create a cache with the given retention policy
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    /// Return the cached schema for `id`, running `load` on a miss
    pub async fn get_or_load<F, Fut>(&self, id: &str, load: F) -> Result<Arc<Schema>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Schema>>,
    {
        let slot = self.slot(id);
        let cached = slot
            .get_or_try_init(|| async move {
                let schema = load().await?;
                debug!(schema_id = id, "Cached expanded schema");
                Ok::<_, error_stack::Report<crate::error::Error>>(CachedSchema {
                    schema:    Arc::new(schema),
                    cached_at: Instant::now(),
                })
            })
            .await?;
        Ok(Arc::clone(&cached.schema))
    }

    /// Return the cached schema for `id` without loading
    pub fn get(&self, id: &str) -> Option<Arc<Schema>> {
        let slot = Arc::clone(self.entries.get(id)?.value());
        let cached = slot.get()?;
        if self.is_expired(cached) {
            return None;
        }
        Some(Arc::clone(&cached.schema))
    }

    /// Drop the entry for `id`; returns whether one existed
    pub fn invalidate(&self, id: &str) -> bool {
        let removed = self.entries.remove(id).is_some();
        if removed {
            debug!(schema_id = id, "Invalidated cached schema");
        }
        removed
    }

    /// Drop every entry
    pub fn clear(&self) { self.entries.clear(); }

    /// Number of cached or loading entries
    pub fn len(&self) -> usize { self.entries.len() }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    fn slot(&self, id: &str) -> Slot {
        let existing = self.entries.get(id).map(|entry| Arc::clone(entry.value()));
        if let Some(slot) = existing {
            if !slot.get().is_some_and(|cached| self.is_expired(cached)) {
                return slot;
            }
            self.entries
                .remove_if(id, |_, current| Arc::ptr_eq(current, &slot));
            debug!(schema_id = id, "Cached schema expired");
        } else {
            self.evict_oldest_if_full();
        }
        Arc::clone(self.entries.entry(id.to_string()).or_default().value())
    }

    fn is_expired(&self, cached: &CachedSchema) -> bool {
        self.config
            .time_to_live()
            .is_some_and(|ttl| cached.cached_at.elapsed() >= ttl)
    }

    fn evict_oldest_if_full(&self) {
        let Some(max_entries) = self.config.max_entries else {
            return;
        };
        while self.entries.len() >= max_entries.max(1) {
            let oldest = self
                .entries
                .iter()
                .filter_map(|entry| {
                    entry
                        .value()
                        .get()
                        .map(|cached| (entry.key().clone(), cached.cached_at))
                })
                .min_by_key(|(_, cached_at)| *cached_at)
                .map(|(key, _)| key);
            let Some(oldest) = oldest else {
                // only loads in flight, nothing evictable
                return;
            };
            self.entries.remove(&oldest);
            debug!(schema_id = %oldest, "Evicted cached schema");
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, reason = "loads in these tests succeed")]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use error_stack::Report;

    use super::*;
    use crate::error::Error;

    fn schema(title: &str) -> Schema {
        let mut schema = Schema::default();
        schema
            .attributes
            .insert("title".to_string(), serde_json::Value::String(title.to_string()));
        schema
    }

    #[tokio::test]
    async fn test_concurrent_misses_load_once() {
        let cache = SchemaCache::default();
        let loads = AtomicUsize::new(0);
        let counter = &loads;
        let load = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(schema("a"))
        };

        let (first, second) = tokio::join!(cache.get_or_load("a", load), cache.get_or_load("a", load));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        let first = first.expect("first waiter");
        let second = second.expect("second waiter");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.get("a").is_some());
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let cache = SchemaCache::default();
        let failed = cache
            .get_or_load("a", || async {
                Err(Report::new(Error::schema_not_found("a")))
            })
            .await;
        assert!(failed.is_err());
        assert!(cache.get("a").is_none());

        let loaded = cache
            .get_or_load("a", || async { Ok(schema("a")) })
            .await
            .expect("retry loads");
        assert_eq!(loaded.attributes.get("title"), Some(&serde_json::json!("a")));
    }

    #[tokio::test]
    async fn test_expired_entries_reload() {
        let cache = SchemaCache::new(CacheConfig {
            time_to_live_secs: Some(0),
            max_entries:       None,
        });
        let loads = AtomicUsize::new(0);
        let counter = &loads;
        for _ in 0..2 {
            let result = cache
                .get_or_load("a", move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(schema("a"))
                })
                .await;
            assert!(result.is_ok());
        }
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert!(cache.get("a").is_none());
    }

    #[tokio::test]
    async fn test_oldest_entry_evicted_when_full() {
        let cache = SchemaCache::new(CacheConfig {
            time_to_live_secs: None,
            max_entries:       Some(2),
        });
        for id in ["a", "b", "c"] {
            assert!(cache.get_or_load(id, move || async move { Ok(schema(id)) }).await.is_ok());
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("c").is_some());

        assert!(cache.invalidate("c"));
        assert!(!cache.invalidate("c"));
        cache.clear();
        assert!(cache.is_empty());
    }
}
