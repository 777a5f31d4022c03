//! File references, inline payloads, and blob persistence

mod bridge;
mod data_url;
mod index;
mod storage;
mod types;

pub use bridge::FileAttributeBridge;
pub use data_url::{DataUrl, is_data_url};
pub use index::FileFieldIndex;
pub use storage::{BlobStore, DataUrlBlobStore, MemoryBlobStore};
pub use types::{StorageFile, StorageKind, WireFile};
