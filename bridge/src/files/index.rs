//! Positions of file fields within an expanded schema

use std::collections::HashSet;
use std::sync::Arc;

use crate::schema::{DerivedCache, Schema};

/// Cached dotted paths of every `file` component, per schema instance
///
/// A key used for a file in one place and a text field elsewhere is only
/// file-valued at the file positions.
#[derive(Default)]
pub struct FileFieldIndex {
    paths: DerivedCache<HashSet<String>>,
}

impl FileFieldIndex {
    /// Create an empty index
    pub fn new() -> Self { Self::default() }

    /// Whether the field at `path` is a file field of `schema`
    pub fn is_file_at(&self, schema_id: &str, schema: &Arc<Schema>, path: &str) -> bool {
        self.file_paths(schema_id, schema).contains(path)
    }

    /// Paths of every file field in `schema`
    pub fn file_paths(&self, schema_id: &str, schema: &Arc<Schema>) -> Arc<HashSet<String>> {
        self.paths.get_or_compute(schema_id, schema, |schema| {
            schema
                .field_paths()
                .into_iter()
                .filter(|(_, component)| component.is_file())
                .map(|(path, _)| path)
                .collect()
        })
    }

    /// Forget the entry for `schema_id`
    pub fn invalidate(&self, schema_id: &str) { self.paths.invalidate(schema_id); }

    /// Forget everything
    pub fn clear(&self) { self.paths.clear(); }

    /// Number of indexed schemas
    pub fn len(&self) -> usize { self.paths.len() }

    /// Whether no schema is indexed
    pub fn is_empty(&self) -> bool { self.paths.is_empty() }
}
