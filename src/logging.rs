//! Logging utilities for the bridge
//!
//! Provides lightweight structured logging for reference-table, router, and
//! dispatch events. Uses `tracing` with minimal overhead.

// Re-export tracing macros for use throughout the bridge
pub use tracing::{debug, error, info, trace, warn, Level};

/// Initialize bridge logging with sensible defaults
///
/// Called once at process attach. For production builds, logs at INFO level
/// and above are enabled. For debug builds, DEBUG and TRACE levels are also
/// enabled. `RUST_LOG` takes precedence over both.
pub fn init_bridge_logging() {
    init_with_filter(None);
}

/// Initialize with an explicit level override (from [`crate::config::BridgeConfig`]).
pub fn init_with_filter(level: Option<&str>) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match level {
        Some(level) => EnvFilter::new(format!("objbridge={}", level)),
        None => {
            #[cfg(debug_assertions)]
            {
                EnvFilter::new("objbridge=debug")
            }
            #[cfg(not(debug_assertions))]
            {
                EnvFilter::new("objbridge=info")
            }
        }
    });

    fmt()
        .with_env_filter(filter)
        .compact()
        .try_init()
        .ok(); // Ignore error if already initialized
}
