//! Logging setup.
//!
//! `RUST_LOG` overrides the default filter, e.g.
//! `RUST_LOG=comptoir_engine=trace,sqlx=info`.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,comptoir=debug,sqlx=warn";

/// Installs the global `tracing` subscriber.
///
/// Does nothing if the host application already installed one.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
