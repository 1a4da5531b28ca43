//! Diagnostic logging setup for the binary and embedding hosts.

use tracing_subscriber::EnvFilter;

/// Filter applied when no directives are configured.
pub const DEFAULT_FILTER: &str = "warn";

/// Installs a stderr `tracing` subscriber.
///
/// Invalid directives fall back to [`DEFAULT_FILTER`]. Returns `false` when a
/// global subscriber is already installed, leaving it untouched.
pub fn init(filter: Option<&str>) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(filter))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .is_ok()
}

fn env_filter(filter: Option<&str>) -> EnvFilter {
    filter
        .map(str::trim)
        .filter(|directives| !directives.is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}
