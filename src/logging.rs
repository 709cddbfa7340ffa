//! Logging initialization. Build progress and warnings are reported through
//! `tracing`; this installs the subscriber that prints them to stderr.

use std::io::IsTerminal;
use tracing_subscriber::EnvFilter;

/// The environment variable that overrides the `-v` verbosity, e.g.
/// `QUILL_LOG=quill=debug`.
pub const LOG_ENV: &str = "QUILL_LOG";

/// Maps a verbosity level to a tracing directive string.
///
/// - 0 → `"warn"`
/// - 1 → `"info"`
/// - 2+ → `"debug"` (saturates)
pub const fn verbosity_to_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Initializes the global tracing subscriber. If `QUILL_LOG` is set it takes
/// precedence over `verbosity`.
pub fn init_logging(verbosity: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(verbosity_to_directive(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none())
        .with_target(verbosity >= 2)
        .with_writer(std::io::stderr)
        .try_init();
}
