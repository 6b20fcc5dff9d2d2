//! Subscriber setup shared by the binaries.

use tracing_subscriber::EnvFilter;

/// Default filter for a `-v` count: 0 → info, 1 → debug, 2+ → trace.
pub fn default_filter(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    format!("sdm_core={level},warn")
}

/// Install a stderr fmt subscriber. `RUST_LOG` overrides the verbosity.
///
/// Calling this twice is harmless; the second call leaves the first
/// subscriber in place.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity > 0)
        .with_writer(std::io::stderr)
        .try_init();
}
