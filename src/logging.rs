//! Tracing setup for hosts and tests.

use tracing_subscriber::{EnvFilter, filter::Directive};

fn filter(default_level: tracing::Level) -> EnvFilter {
    let directive: Directive = format!("wallet_realtime_sync={}", default_level)
        .parse()
        .unwrap_or_else(|_| default_level.into());
    EnvFilter::from_default_env().add_directive(directive)
}

/// Install a compact `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_level` for this crate.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing(default_level: tracing::Level) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(default_level))
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Same as [`init_tracing`], writing through the test harness so output is
/// only shown for failing tests.
pub fn init_test_tracing(default_level: tracing::Level) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(default_level))
        .with_target(false)
        .with_test_writer()
        .try_init();
}
