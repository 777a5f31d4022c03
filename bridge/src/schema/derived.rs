//! Lookups computed from an expanded schema
//!
//! Entries remember the schema instance they were computed from. A reloaded
//! schema is a new instance, so its lookups are recomputed on first use and
//! entries whose schema is no longer held anywhere are pruned.

use std::sync::{Arc, Weak};

use dashmap::DashMap;

use super::component::Schema;

/// Per schema id cache of a value derived from the schema
pub struct DerivedCache<T> {
    entries: DashMap<String, (Weak<Schema>, Arc<T>)>,
}

impl<T> Default for DerivedCache<T> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<T> DerivedCache<T> {
    /// Create an empty cache
    pub fn new() -> Self { Self::default() }

    /// Value derived from `schema`, computed once per schema instance
    pub fn get_or_compute(
        &self,
        schema_id: &str,
        schema: &Arc<Schema>,
        compute: impl FnOnce(&Schema) -> T,
    ) -> Arc<T> {
        let source = Arc::downgrade(schema);
        if let Some(entry) = self.entries.get(schema_id)
            && Weak::ptr_eq(&entry.0, &source)
        {
            return Arc::clone(&entry.1);
        }

        let value = Arc::new(compute(schema));
        self.entries.retain(|_, (held, _)| held.strong_count() > 0);
        self.entries
            .insert(schema_id.to_string(), (source, Arc::clone(&value)));
        value
    }

    /// Forget the entry for `schema_id`
    pub fn invalidate(&self, schema_id: &str) { self.entries.remove(schema_id); }

    /// Forget everything
    pub fn clear(&self) { self.entries.clear(); }

    /// Number of cached schemas
    pub fn len(&self) -> usize { self.entries.len() }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}
