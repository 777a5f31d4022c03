//! Configuration for the form processing service
//!
//! Every field has a default so hosts can deserialize partial documents from
//! whatever format they keep their settings in.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BORROW_TIMEOUT, DEFAULT_EVICTION_INTERVAL, DEFAULT_MAX_EXPANSION_DEPTH,
    DEFAULT_MIN_EVICTABLE_IDLE, DEFAULT_READ_TIMEOUT, DEFAULT_RUNTIME_PROGRAM,
    DEFAULT_SHUTDOWN_GRACE,
};
use crate::error::{Error, Result};
use crate::logging::TracingLevel;

/// Top level configuration for [`crate::FormProcessingService`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormServiceConfig {
    /// Script runtime pool sizing and timeouts
    pub pool:                PoolConfig,
    /// Command used to start each script runtime
    pub runtime:             RuntimeCommand,
    /// Retention policy for schema caches
    pub cache:               CacheConfig,
    /// Path forwarded to the runtime as `resourcePath`
    pub resource_path:       String,
    /// Sub-schema nesting depth treated as a reference cycle
    pub max_expansion_depth: usize,
    /// Diagnostics level and optional trace file
    pub logging:             LoggingConfig,
}

impl Default for FormServiceConfig {
    fn default() -> Self {
        Self {
            pool:                PoolConfig::default(),
            runtime:             RuntimeCommand::default(),
            cache:               CacheConfig::default(),
            resource_path:       String::new(),
            max_expansion_depth: DEFAULT_MAX_EXPANSION_DEPTH,
            logging:             LoggingConfig::default(),
        }
    }
}

impl FormServiceConfig {
    /// Parse a configuration from JSON, filling absent fields with defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| error_stack::Report::new(Error::invalid("configuration", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pool cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.pool.max_total == 0 {
            return Err(error_stack::Report::new(Error::invalid(
                "pool.max_total",
                "must be at least 1",
            )));
        }
        if self.max_expansion_depth == 0 {
            return Err(error_stack::Report::new(Error::invalid(
                "max_expansion_depth",
                "must be at least 1",
            )));
        }
        if self.runtime.program.is_empty() {
            return Err(error_stack::Report::new(Error::missing("runtime.program")));
        }
        Ok(())
    }
}

/// Sizing and timing of the script runtime pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on live runtime instances
    pub max_total:               usize,
    /// Idle instances kept beyond this watermark are destroyed on return or eviction
    pub max_idle:                usize,
    /// Seconds an idle instance must be unused before eviction destroys it
    pub min_evictable_idle_secs: u64,
    /// Seconds between background eviction runs
    pub eviction_interval_secs:  u64,
    /// Seconds a borrow may wait for a free instance
    pub borrow_timeout_secs:     u64,
    /// Seconds allowed for a runtime to answer one command
    pub read_timeout_secs:       u64,
    /// Seconds between SIGTERM and a forced kill on destroy
    pub shutdown_grace_secs:     u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let processors = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
        Self {
            max_total:               processors,
            max_idle:                processors,
            min_evictable_idle_secs: DEFAULT_MIN_EVICTABLE_IDLE,
            eviction_interval_secs:  DEFAULT_EVICTION_INTERVAL,
            borrow_timeout_secs:     DEFAULT_BORROW_TIMEOUT,
            read_timeout_secs:       DEFAULT_READ_TIMEOUT,
            shutdown_grace_secs:     DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl PoolConfig {
    /// Borrow wait bound
    pub const fn borrow_timeout(&self) -> Duration { Duration::from_secs(self.borrow_timeout_secs) }

    /// Per-command response timeout
    pub const fn read_timeout(&self) -> Duration { Duration::from_secs(self.read_timeout_secs) }

    /// Minimum idle time before eviction
    pub const fn min_evictable_idle(&self) -> Duration {
        Duration::from_secs(self.min_evictable_idle_secs)
    }

    /// Period of the background evictor
    pub const fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }

    /// Grace period granted on destroy
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Command line used to start a script runtime process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeCommand {
    /// Executable name or path
    pub program:     String,
    /// Arguments passed to the executable
    pub args:        Vec<String>,
    /// Extra environment variables
    pub env:         HashMap<String, String>,
    /// Working directory, inherited when absent
    pub working_dir: Option<PathBuf>,
}

impl Default for RuntimeCommand {
    fn default() -> Self {
        Self {
            program:     DEFAULT_RUNTIME_PROGRAM.to_string(),
            args:        Vec::new(),
            env:         HashMap::new(),
            working_dir: None,
        }
    }
}

impl RuntimeCommand {
    /// Create a command for `program` with `args`
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Retention policy applied to the schema cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds an expanded schema stays cached; forever when absent
    pub time_to_live_secs: Option<u64>,
    /// Maximum number of cached schemas; unbounded when absent
    pub max_entries:       Option<usize>,
}

impl CacheConfig {
    /// Retention as a duration
    pub fn time_to_live(&self) -> Option<Duration> {
        self.time_to_live_secs.map(Duration::from_secs)
    }
}

/// Diagnostics settings, applied when a service is created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Most verbose level this crate emits at
    pub level:      TracingLevel,
    /// File receiving trace output when the host has no subscriber of its own
    pub trace_file: Option<PathBuf>,
}

#[cfg(test)]
#[allow(clippy::expect_used, reason = "fixtures are valid")]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = FormServiceConfig::from_json_str(
            r#"{ "pool": { "max_total": 2 }, "runtime": { "program": "sh", "args": ["-c", "cat"] } }"#,
        );
        let config = config.expect("partial config parses");
        assert_eq!(config.pool.max_total, 2);
        assert_eq!(config.pool.read_timeout_secs, DEFAULT_READ_TIMEOUT);
        assert_eq!(config.runtime.program, "sh");
        assert_eq!(config.max_expansion_depth, DEFAULT_MAX_EXPANSION_DEPTH);
        assert!(config.cache.time_to_live().is_none());
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_logging_section() {
        let config = FormServiceConfig::from_json_str(
            r#"{ "logging": { "level": "debug", "trace_file": "/var/log/formbridge.log" } }"#,
        )
        .expect("logging config parses");
        assert_eq!(config.logging.level, TracingLevel::Debug);
        assert_eq!(
            config.logging.trace_file.as_deref(),
            Some(std::path::Path::new("/var/log/formbridge.log"))
        );
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        let result = FormServiceConfig::from_json_str(r#"{ "pool": { "max_total": 0 } }"#);
        assert!(matches!(
            result.map_err(|e| e.current_context().clone()),
            Err(Error::InvalidArgument(_))
        ));
    }
}
