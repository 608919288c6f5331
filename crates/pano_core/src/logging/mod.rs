//! Logging infrastructure for pano-ingest.
//!
//! This module provides:
//! - Per-unit loggers with file + callback dual output
//! - Compact mode that keeps tool output in a tail buffer
//! - Integration with the `tracing` ecosystem
//!
//! # Example
//!
//! ```no_run
//! use pano_core::logging::{LogConfig, UnitLogger};
//!
//! let logger = UnitLogger::new("unit_000_REC001", "/tmp/logs", LogConfig::default(), None).unwrap();
//! logger.phase("Stitch");
//! logger.command("stitcher_demo --input a.insv b.insv --output out.mp4");
//! logger.success("Stitched REC001");
//! ```

mod types;
mod unit_logger;

pub use types::{LogCallback, LogConfig, LogLevel, MessagePrefix};
pub use unit_logger::UnitLogger;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_level`. Output goes to stderr so it does
/// not mix with unit log echo on stdout. Safe to call more than once; later
/// calls are ignored.
pub fn init_tracing(default_level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter_str()));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .try_init();
}

/// Initialize tracing for tests (only logs warnings and above).
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_test_tracing();
        init_tracing(LogLevel::Debug);
        init_tracing(LogLevel::Info);
    }
}
