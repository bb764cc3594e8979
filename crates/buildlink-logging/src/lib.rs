//! # buildlink-logging
//!
//! `tracing` subscriber setup for processes embedding a buildlink client,
//! plus an in-memory capture layer for asserting on log output in tests.

#![deny(unsafe_code)]

pub mod test_utils;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

use buildlink_settings::LoggingSettings;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber with compact stderr output.
///
/// `RUST_LOG` wins over `level` when set. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init fails if a global subscriber is already set
    let _ = subscriber.try_init();
}

/// Initialize the global subscriber from [`LoggingSettings`].
///
/// With `json` set, each event is written to stderr as one JSON object.
pub fn init_from_settings(settings: &LoggingSettings) {
    if settings.json {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter(&settings.level))
            .with_writer(std::io::stderr)
            .json()
            .flatten_event(true);
        let _ = subscriber.try_init();
    } else {
        init_subscriber(&settings.level);
    }
}

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}
