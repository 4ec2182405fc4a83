// SPDX-License-Identifier: MPL-2.0

//! Tracing subscriber setup for embedding applications

use tracing::debug;

/// Install a formatted subscriber filtered by `RUST_LOG`
///
/// Falls back to `default_filter` (e.g. `"stillcam=debug"`) when the
/// environment variable is unset or invalid. Returns `false` if a global
/// subscriber was already installed; that one is left in place.
pub fn init(default_filter: &str) -> bool {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_target(true)
        .with_level(true)
        .try_init()
        .is_ok();

    if installed {
        debug!(
            version = crate::constants::app_info::version(),
            "Logging initialised"
        );
    }
    installed
}

/// [`init`] with the crate's default filter
pub fn init_default() -> bool {
    init(crate::constants::capture::DEFAULT_LOG_FILTER)
}
