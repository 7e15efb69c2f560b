//! Logging setup for the command-line driver

use tracing_subscriber::prelude::*;

/// Initialize logging with sensible defaults
///
/// Honors `RUST_LOG` when set; otherwise logs the pipeline at debug level in debug
/// builds and at info level in release builds.
pub fn setup_logging() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;

    if std::env::var("RUST_LOG").is_err() {
        // Safety: single-threaded at startup
        unsafe {
            if cfg!(debug_assertions) {
                std::env::set_var("RUST_LOG", "info,tile_overlay=debug,tile_overlay_lib=debug");
            } else {
                std::env::set_var("RUST_LOG", "info");
            }
        }
    }

    let fmt_layer = fmt::layer().with_filter(EnvFilter::from_default_env());
    let registry = tracing_subscriber::registry().with(fmt_layer);
    registry.init();

    tracing::debug!("Logging initialized");
}
