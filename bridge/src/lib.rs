//! Server-side data handling for formio-style form schemas
//!
//! A form schema is a tree of components. Some bind data (inputs, containers,
//! grids), some only arrange other components (panels, columns, tabs). This
//! crate keeps the data a client submits consistent with that tree:
//!
//! - sub-form references are inlined into one expanded schema and cached
//! - submitted and stored data are reconciled so read-only fields keep their
//!   stored values and unbound data is dropped
//! - grids flagged `noRowWrapping` are converted between bare rows and the
//!   row objects the client runtime expects
//! - file fields are converted between the storage and wire representations,
//!   moving inline payloads into a [`BlobStore`]
//! - validation and cleanup run in a pool of external script runtimes
//!   speaking a line-in, EOT-terminated-out JSON protocol
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use formbridge::{
//!     DataUrlBlobStore, DirectoryResourceProvider, FormProcessingService, FormServiceConfig,
//! };
//!
//! # async fn run() -> formbridge::Result<()> {
//! let service = FormProcessingService::with_process_runtime(
//!     FormServiceConfig::default(),
//!     Arc::new(DirectoryResourceProvider::new("forms")),
//!     Arc::new(DataUrlBlobStore),
//! )?;
//!
//! let submitted = serde_json::Map::new();
//! let current = serde_json::Map::new();
//! let cleaned = service
//!     .dry_validate_and_cleanup("order.json", &submitted, &current)
//!     .await?;
//! println!("{}", cleaned.to_value());
//! service.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod constants;
pub mod data;
mod error;
pub mod files;
pub mod logging;
pub mod resources;
pub mod runtime;
pub mod schema;
mod service;

pub use config::{CacheConfig, FormServiceConfig, LoggingConfig, PoolConfig, RuntimeCommand};
pub use data::{Variable, VariableSet, WireDocument};
pub use error::{Error, Result};
pub use files::{BlobStore, DataUrlBlobStore, FileAttributeBridge, MemoryBlobStore};
pub use resources::{DirectoryResourceProvider, MemoryResourceProvider, ResourceProvider};
pub use runtime::{ProcessRuntimeFactory, RuntimeFactory, ScriptRuntime, ScriptRuntimePool};
pub use schema::{Component, Schema};
pub use service::FormProcessingService;
