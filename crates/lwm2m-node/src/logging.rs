//! Tracing subscriber setup.
//!
//! Level conventions used across the workspace:
//! - WARN: stray or unexpected messages that were ignored or rejected, failed exchanges
//! - INFO: exchange completion and retransmissions
//! - DEBUG: state transitions, block progress, cache hits
//! - TRACE: timer arming and cache slot bookkeeping

use tracing_subscriber::EnvFilter;

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize human-readable logging.
///
/// `RUST_LOG` wins over `default_level` when set.
pub fn init(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(default_level))
        .init();
}

/// Initialize JSON logging, selected with `RUST_LOG_FORMAT=json`.
pub fn init_json(default_level: &str) {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter(default_level))
        .init();
}

/// Initialize logging for tests. Safe to call more than once.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("debug"))
        .with_test_writer()
        .try_init();
}
