use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use error_stack::Report;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};
use tracing::subscriber::Interest;
use tracing::{Level, Metadata, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::constants::LOG_TARGET;
use crate::error::{Error, Result};

static CRATE_LEVEL: AtomicU8 = AtomicU8::new(TracingLevel::Warn as u8);

/// Verbosity of this crate's diagnostics
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, AsRefStr, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum TracingLevel {
    /// Failures only
    Error,
    /// Failures and recoverable oddities such as malformed rows
    #[default]
    Warn,
    /// Service and pool lifecycle
    Info,
    /// Cache, pool, and runtime activity per operation
    Debug,
    /// Every file conversion and frame
    Trace,
}

impl FromStr for TracingLevel {
    type Err = Report<Error>;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        Self::iter()
            .find(|level| level.as_ref().eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                Report::new(Error::invalid(
                    "tracing level",
                    format!("'{name}', expected error, warn, info, debug or trace"),
                ))
            })
    }
}

impl TracingLevel {
    /// Level this crate currently emits at
    pub fn current() -> Self {
        let stored = CRATE_LEVEL.load(Ordering::Relaxed);
        Self::iter()
            .find(|level| *level as u8 == stored)
            .unwrap_or_default()
    }

    /// Make this the level this crate emits at
    pub fn set_current(self) {
        let previous = CRATE_LEVEL.swap(self as u8, Ordering::Relaxed);
        if previous != self as u8 {
            tracing::debug!(level = %self, "Tracing level changed");
        }
    }

    const fn as_level(self) -> Level {
        match self {
            Self::Error => Level::ERROR,
            Self::Warn => Level::WARN,
            Self::Info => Level::INFO,
            Self::Debug => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }
}

/// Layer letting this crate's events through at [`TracingLevel::current`]
/// and everything else at warnings and above
#[derive(Debug, Clone, Copy, Default)]
pub struct CrateFilter;

impl CrateFilter {
    fn admits(level: Level, target: &str, current: TracingLevel) -> bool {
        let ceiling = if is_crate_target(target) {
            current.as_level()
        } else {
            Level::WARN
        };
        level <= ceiling
    }
}

fn is_crate_target(target: &str) -> bool {
    target
        .strip_prefix(LOG_TARGET)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

impl<S: Subscriber> Layer<S> for CrateFilter {
    fn register_callsite(&self, _metadata: &'static Metadata<'static>) -> Interest {
        // the level can change after registration
        Interest::sometimes()
    }

    fn enabled(&self, metadata: &Metadata<'_>, _ctx: Context<'_, S>) -> bool {
        Self::admits(*metadata.level(), metadata.target(), TracingLevel::current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        for level in TracingLevel::iter() {
            assert!(matches!(level.as_ref().parse::<TracingLevel>(), Ok(parsed) if parsed == level));
        }
        assert!(matches!(" DEBUG ".parse::<TracingLevel>(), Ok(TracingLevel::Debug)));
        assert!(matches!(
            "verbose".parse::<TracingLevel>().map_err(|e| e.current_context().clone()),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(
            serde_json::to_value(TracingLevel::Info).ok(),
            Some(serde_json::json!("info"))
        );
    }

    #[test]
    fn test_crate_events_follow_the_configured_level() {
        let own = "formbridge::runtime::pool";
        assert!(CrateFilter::admits(Level::DEBUG, own, TracingLevel::Debug));
        assert!(!CrateFilter::admits(Level::TRACE, own, TracingLevel::Debug));
        assert!(!CrateFilter::admits(Level::INFO, own, TracingLevel::Warn));
        assert!(CrateFilter::admits(Level::ERROR, "formbridge", TracingLevel::Error));
    }

    #[test]
    fn test_foreign_events_need_warn() {
        assert!(CrateFilter::admits(Level::WARN, "hyper::proto", TracingLevel::Trace));
        assert!(!CrateFilter::admits(Level::DEBUG, "hyper::proto", TracingLevel::Trace));
        assert!(!CrateFilter::admits(Level::DEBUG, "formbridge_extra", TracingLevel::Trace));
    }
}
