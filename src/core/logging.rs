/// Logging Setup
///
/// Logs always go to stderr: in STDIO mode stdout carries protocol frames and
/// any stray byte there would corrupt the stream.

use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber. The filter comes from `RUST_LOG`,
/// defaulting to `info`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
