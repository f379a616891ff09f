//! Structured logging with `tracing`.
//!
//! The controller never surfaces errors to end users; best-effort failures and
//! backend halts are reported through `tracing` instead. This module provides
//! the subscriber bootstrap for binaries and a capture layer for tests.

pub mod test_utils;

use tracing_subscriber::EnvFilter;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

/// Output format of the global subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact human-readable lines.
    #[default]
    Compact,
    /// One JSON object per line, for log collectors.
    Json,
}

/// `RUST_LOG` when set, `level` otherwise.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber writing to stderr in `format`.
///
/// Returns false when a global subscriber was already installed.
pub fn init_with_format(level: &str, format: LogFormat) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Compact => builder.with_target(true).compact().try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}

/// Install the compact stderr subscriber. Repeated calls are no-ops.
pub fn init_subscriber(level: &str) {
    let _ = init_with_format(level, LogFormat::Compact);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        init_subscriber("warn");
        assert!(!init_with_format("debug", LogFormat::Json));
    }
}
