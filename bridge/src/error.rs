use error_stack::Report;
use thiserror::Error;

// Error message prefixes
const MSG_FAILED_TO_PREFIX: &str = "Failed to";
const MSG_INVALID_PREFIX: &str = "Invalid";
const MSG_MISSING_PREFIX: &str = "Missing";
const MSG_UNEXPECTED_PREFIX: &str = "Unexpected";

/// Result type for the `formbridge` library
pub type Result<T> = std::result::Result<T, Report<Error>>;

/// Error kinds surfaced by the form processing core
///
/// The first five variants are the kinds callers of the facade observe; the
/// remaining ones describe failures in collaborators and are re-contexted at
/// the facade boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A schema or referenced sub-schema could not be retrieved or parsed
    #[error("Schema resolution failed: {0}")]
    SchemaResolution(String),

    /// The script runtime wrote to its error channel, timed out, or could not start
    #[error("Script runtime protocol error: {0}")]
    RuntimeProtocol(String),

    /// Data does not have the shape the schema expects
    #[error("Malformed data: {0}")]
    MalformedData(String),

    /// No runtime instance became available within the configured wait bound
    #[error("Script runtime pool exhausted: {0}")]
    PoolExhausted(String),

    /// Validation or cleanup through the script runtime failed
    #[error("Validation failed: {0}")]
    ValidationFailure(String),

    /// The blob store rejected a store or retrieve request
    #[error("File storage error: {0}")]
    FileStorage(String),

    /// Encoding or decoding JSON failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A caller supplied an argument the core cannot use
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A resource provider has no resource under the requested key
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),
}

impl Error {
    // Builder methods for common patterns

    /// Create a "Failed to X" runtime error
    pub fn failed_to(action: &str, details: impl std::fmt::Display) -> Self {
        Self::RuntimeProtocol(format!("{MSG_FAILED_TO_PREFIX} {action}: {details}"))
    }

    /// Create an "Invalid X" error
    pub fn invalid(what: &str, details: impl std::fmt::Display) -> Self {
        Self::InvalidArgument(format!("{MSG_INVALID_PREFIX} {what}: {details}"))
    }

    /// Create a "Missing X" error
    pub fn missing(what: &str) -> Self {
        Self::InvalidArgument(format!("{MSG_MISSING_PREFIX} {what}"))
    }

    /// Create an "Unexpected X" error for malformed data
    pub fn unexpected(what: &str, details: impl std::fmt::Display) -> Self {
        Self::MalformedData(format!("{MSG_UNEXPECTED_PREFIX} {what}: {details}"))
    }

    /// Create error for a schema that cannot be found
    pub fn schema_not_found(key: &str) -> Self {
        Self::SchemaResolution(format!("no schema found under key '{key}'"))
    }

    /// Create error for a process that could not be driven
    pub fn process_failed(operation: &str, pid: Option<u32>, error: impl std::fmt::Display) -> Self {
        pid.map_or_else(
            || Self::RuntimeProtocol(format!("{MSG_FAILED_TO_PREFIX} {operation}: {error}")),
            |pid| {
                Self::RuntimeProtocol(format!(
                    "{MSG_FAILED_TO_PREFIX} {operation} (PID: {pid}): {error}"
                ))
            },
        )
    }

    /// Create error for JSON encoding or decoding failures
    pub fn serialization(what: &str, error: impl std::fmt::Display) -> Self {
        Self::Serialization(format!("{MSG_FAILED_TO_PREFIX} serialize {what}: {error}"))
    }

    /// Create error for blob store failures
    pub fn storage_failed(operation: &str, id: &str, error: impl std::fmt::Display) -> Self {
        Self::FileStorage(format!(
            "{MSG_FAILED_TO_PREFIX} {operation} blob '{id}': {error}"
        ))
    }

    /// Whether a caller may retry the operation that produced this error
    pub const fn is_retryable(&self) -> bool { matches!(self, Self::PoolExhausted(_)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_pool_exhaustion_is_retryable() {
        assert!(Error::PoolExhausted("busy".to_string()).is_retryable());
        assert!(!Error::RuntimeProtocol("stderr".to_string()).is_retryable());
        assert!(!Error::ValidationFailure("bad".to_string()).is_retryable());
        assert!(!Error::schema_not_found("forms/a.json").is_retryable());
    }

    #[test]
    fn test_builder_messages() {
        assert_eq!(
            Error::process_failed("spawn runtime", Some(42), "no such file").to_string(),
            "Script runtime protocol error: Failed to spawn runtime (PID: 42): no such file"
        );
        assert_eq!(
            Error::missing("schema key").to_string(),
            "Invalid argument: Missing schema key"
        );
    }
}
