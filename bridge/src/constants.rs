// Script runtime defaults
/// Program launched for each pooled runtime when no command is configured
pub const DEFAULT_RUNTIME_PROGRAM: &str = "node";

/// Byte terminating every response frame written by a runtime
pub const FRAME_TERMINATOR: u8 = 0x04;

/// Seconds to wait for a runtime response before the instance is discarded
pub const DEFAULT_READ_TIMEOUT: u64 = 30;

/// Seconds a caller may wait to borrow a runtime from an exhausted pool
pub const DEFAULT_BORROW_TIMEOUT: u64 = 30;

/// Seconds an idle runtime must sit unused before eviction may destroy it
pub const DEFAULT_MIN_EVICTABLE_IDLE: u64 = 30 * 60;

/// Seconds between background eviction runs
pub const DEFAULT_EVICTION_INTERVAL: u64 = 5 * 60;

/// Seconds granted to a runtime between SIGTERM and a forced kill
pub const DEFAULT_SHUTDOWN_GRACE: u64 = 5;

/// Largest response frame accepted from a runtime (64MB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

// Schema handling
/// Nesting depth at which sub-schema expansion gives up
pub const DEFAULT_MAX_EXPANSION_DEPTH: usize = 100;

/// Suffix appended to a `form` component key to locate the referenced schema
pub const SUBFORM_RESOURCE_SUFFIX: &str = ".json";

/// Component property that switches array rows to bare values in storage
pub const NO_ROW_WRAPPING_PROPERTY: &str = "noRowWrapping";

/// Component property deciding whether a saved-state submission is processed
pub const SUBMISSION_PROCESSED_PROPERTY: &str = "isSubmissionProcessed";

/// Component action marking a button that saves intermediate state
pub const SAVE_STATE_ACTION: &str = "saveState";

// Files
/// Scheme prefix of inline data URLs
pub const DATA_URL_PREFIX: &str = "data:";

/// Encoding marker separating the mime type from an inline payload
pub const BASE64_MARKER: &str = ";base64,";

/// Mime type used when a file reference does not carry one
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// URL scheme of blobs held by the in-memory blob store
pub const MEMORY_BLOB_SCHEME: &str = "memory://";

/// Key prefix used by deployment-scoped resource keys, e.g. `embedded:app:forms/a.json`
pub const EMBEDDED_KEY_PREFIX: &str = "embedded:";

// Logging
/// Target prefix of every event this crate emits
pub const LOG_TARGET: &str = env!("CARGO_CRATE_NAME");
