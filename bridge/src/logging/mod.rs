//! Diagnostics setup applied from [`crate::FormServiceConfig::logging`]
//!
//! The crate always emits through `tracing`. Hosts with their own subscriber
//! only pick a level; hosts without one can name a trace file and a global
//! subscriber writing to it is installed on first use.

mod level;
mod trace_file;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use error_stack::Report;
use tracing::{Subscriber, warn};
use tracing_subscriber::Registry;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub use self::level::{CrateFilter, TracingLevel};
pub use self::trace_file::{TraceFile, TraceFileWriter};
use crate::config::LoggingConfig;
use crate::error::{Error, Result};

static INSTALLED_TRACE_FILE: OnceLock<PathBuf> = OnceLock::new();

/// Apply `config`: set the crate level and install the trace file subscriber
///
/// Only the first trace file is ever installed; later requests for a
/// different file, and hosts that already set a global subscriber, get a
/// warning instead.
pub fn configure(config: &LoggingConfig) {
    config.level.set_current();
    let Some(requested) = &config.trace_file else {
        return;
    };

    let mut installed = Ok(());
    let active = INSTALLED_TRACE_FILE.get_or_init(|| {
        installed = install_trace_file(requested);
        requested.clone()
    });
    if let Err(report) = installed {
        warn!(path = %requested.display(), error = ?report, "Trace file not installed");
    } else if active != requested {
        warn!(
            requested = %requested.display(),
            active = %active.display(),
            "Trace file already installed, keeping it"
        );
    }
}

/// Trace file installed by [`configure`], if any
pub fn installed_trace_file() -> Option<&'static Path> {
    INSTALLED_TRACE_FILE.get().map(PathBuf::as_path)
}

/// Subscriber writing events admitted by [`CrateFilter`] to `path`
pub fn trace_file_subscriber(path: PathBuf) -> impl Subscriber + Send + Sync {
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(TraceFile::new(path))
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true);
    Registry::default().with(CrateFilter).with(file_layer)
}

fn install_trace_file(path: &Path) -> Result<()> {
    trace_file_subscriber(path.to_path_buf())
        .try_init()
        .map_err(|e| Report::new(Error::invalid("trace file subscriber", e)))
}
