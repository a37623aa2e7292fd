//! Tracing subscriber setup for embedders
//!
//! The engine only emits `tracing` events; installing a subscriber is left
//! to the embedding application. `init` covers the common case.

use crate::config::GeneralConfig;
use crate::error::{DepcacheError, DepcacheResult};
use tracing_subscriber::EnvFilter;

/// Filter directive for a verbosity level
pub fn filter_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "depcache=warn",
        1 => "depcache=info",
        2 => "depcache=debug",
        _ => "depcache=trace",
    }
}

/// Install a global fmt subscriber
///
/// `RUST_LOG` takes precedence over the configured verbosity. Fails if a
/// global subscriber is already installed.
pub fn init(config: &GeneralConfig) -> DepcacheResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config.verbose)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let result = if config.log_format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| DepcacheError::Logging(e.to_string()))
}
