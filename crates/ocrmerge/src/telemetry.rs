//! Process-wide logging setup.
//!
//! The crate logs through both `log` macros and `tracing` spans. This installs
//! one `tracing` subscriber and bridges `log` records into it, so a host only
//! has to call [`init_logging`] once.

use std::sync::OnceLock;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

static INSTALLED: OnceLock<bool> = OnceLock::new();

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Installs the global subscriber.
///
/// `default_filter` applies when `RUST_LOG` is unset. Returns `true` if this
/// call installed the subscriber; later calls are no-ops and return `false`.
pub fn init_logging(default_filter: &str, format: LogFormat) -> bool {
    let mut installed_now = false;
    INSTALLED.get_or_init(|| {
        installed_now = install(default_filter, format);
        installed_now
    });
    installed_now
}

/// Whether a subscriber was installed by [`init_logging`].
pub fn is_initialized() -> bool {
    INSTALLED.get().copied().unwrap_or(false)
}

fn install(default_filter: &str, format: LogFormat) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // try_init also installs the log bridge; fails if the host already set a
    // global subscriber or logger.
    let result = match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init(),
    };

    match result {
        Ok(()) => {
            log::debug!("Logging initialized");
            true
        }
        Err(e) => {
            // Fall back to bridging log records into whatever is installed.
            let _ = tracing_log::LogTracer::init();
            eprintln!("ocrmerge: logging already configured: {}", e);
            false
        }
    }
}
