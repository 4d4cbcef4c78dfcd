//! Diagnostic logging setup.
//!
//! Logs go to stderr so stdout stays reserved for command output and JSON.
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding a tracing filter directive.
pub const LOG_ENV: &str = "DOCFLOW_LOG";

/// Install the global subscriber.
///
/// `DOCFLOW_LOG` wins when set; otherwise `--verbose` selects debug and the
/// default is warnings only.
pub fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    // A second init (tests) fails harmlessly.
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose)
                .without_time(),
        )
        .with(filter)
        .try_init();
}
