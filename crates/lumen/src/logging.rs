//! Log output for LUMEN binaries.
//!
//! Library crates only emit `tracing` events; installing a subscriber is the
//! application's job. `RUST_LOG` overrides the default directive, e.g.
//! `RUST_LOG=lumen_render=trace` for per-frame acquire/submit/present.

use tracing_subscriber::EnvFilter;

/// Installs a formatting subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive`. Returns false if a subscriber was already installed.
pub fn init_logging(default_directive: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
