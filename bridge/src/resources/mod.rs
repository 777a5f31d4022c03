//! Resource retrieval collaborators
//!
//! Schemas and every other named resource come through [`ResourceProvider`].
//! The core never touches a backing store directly.

mod directory;
mod memory;

use async_trait::async_trait;
pub use directory::DirectoryResourceProvider;
pub use memory::MemoryResourceProvider;

use crate::error::Result;

/// Supplies raw resource bytes by key
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Fetch the resource stored under `key`
    ///
    /// Returns `Ok(None)` when nothing is stored under the key.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// List the keys starting with `prefix`, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}
