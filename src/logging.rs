//! Logging configuration and initialization

use tracing::{debug, trace};
use tracing_subscriber::EnvFilter;

/// Set to any non-empty value to log at debug level
pub const VERBOSE_ENV: &str = "VERBOSE";

/// Filter directive for a `-v` count, raised to debug when `VERBOSE` is set
pub fn log_level(verbose: u8, verbose_env: Option<&str>) -> &'static str {
    let forced = verbose_env.is_some_and(|value| !value.is_empty());
    match verbose {
        0 if forced => "debug",
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Initialize tracing for the CLI. `RUST_LOG` wins over the computed level.
pub fn init_logging(verbose: u8) {
    let verbose_env = std::env::var(VERBOSE_ENV).ok();
    let level = log_level(verbose, verbose_env.as_deref());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .with_line_number(verbose >= 3)
        .init();

    debug!("tier-engine started with verbosity level: {verbose}");
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());
}
