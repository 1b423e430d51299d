//! Logging initialization.
//!
//! Called once by the embedding shell at startup. Respects `RUST_LOG` when
//! set; otherwise `DISPATCHER_DEBUG` raises the default filter to trace.

/// Check if debug mode is enabled via environment variable.
fn is_debug_mode() -> bool {
    std::env::var("DISPATCHER_DEBUG").is_ok()
}

/// Initialize the logging system.
pub fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default_filter = if is_debug_mode() {
        "dispatcher=trace,info"
    } else {
        "dispatcher=info,warn"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_line_number(true))
        .with(filter)
        .init();

    tracing::debug!("Logging initialized");
}
