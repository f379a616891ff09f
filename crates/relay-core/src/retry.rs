//! Retry budgets and backoff calculation.
//!
//! Provides the portable building blocks for mutation retries. The async retry
//! loop itself lives in `relay-stream` (which owns the clock); this module only
//! holds the numbers:
//!
//! - [`RetryPolicy`]: attempt budget plus linear backoff base
//! - [`linear_backoff_ms`]: `base × attempt`

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::TransportError;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Attempts for sequence-carrying entity mutations.
pub const SEQUENCED_MAX_ATTEMPTS: u32 = 8;
/// Attempts for simple element updates (plain edits, placeholder clears).
pub const ELEMENT_MAX_ATTEMPTS: u32 = 3;
/// Attempts for cleanup calls (message deletion).
pub const CLEANUP_MAX_ATTEMPTS: u32 = 5;
/// Backoff base for sequenced and cleanup mutations.
pub const DEFAULT_BASE_DELAY_MS: u64 = 100;
/// Backoff base for element updates.
pub const ELEMENT_BASE_DELAY_MS: u64 = 250;

/// Attempt budget and linear backoff for one class of mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay multiplied by the attempt number between attempts, in ms.
    pub base_delay_ms: u64,
}

impl RetryPolicy {
    /// Policy for sequence-carrying mutations (content, summary, close).
    #[must_use]
    pub const fn sequenced() -> Self {
        Self {
            max_attempts: SEQUENCED_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
        }
    }

    /// Policy for simple element updates.
    #[must_use]
    pub const fn element() -> Self {
        Self {
            max_attempts: ELEMENT_MAX_ATTEMPTS,
            base_delay_ms: ELEMENT_BASE_DELAY_MS,
        }
    }

    /// Policy for best-effort cleanup.
    #[must_use]
    pub const fn cleanup() -> Self {
        Self {
            max_attempts: CLEANUP_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
        }
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed.
    #[must_use]
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before the attempt following failed attempt `attempt`.
    ///
    /// A remote retry-after hint wins when it is longer than the linear backoff.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, error: &TransportError) -> Duration {
        let backoff = linear_backoff_ms(attempt, self.base_delay_ms);
        let delay = error.retry_after_ms().map_or(backoff, |hint| backoff.max(hint));
        Duration::from_millis(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::sequenced()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Linear backoff: `base_delay_ms × attempt`, saturating.
///
/// `attempt` is the 1-based number of the attempt that just failed.
#[must_use]
pub fn linear_backoff_ms(attempt: u32, base_delay_ms: u64) -> u64 {
    base_delay_ms.saturating_mul(u64::from(attempt))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        assert_eq!(RetryPolicy::sequenced().max_attempts, 8);
        assert_eq!(RetryPolicy::sequenced().base_delay_ms, 100);
        assert_eq!(RetryPolicy::element().max_attempts, 3);
        assert_eq!(RetryPolicy::element().base_delay_ms, 250);
        assert_eq!(RetryPolicy::cleanup().max_attempts, 5);
        assert_eq!(RetryPolicy::default(), RetryPolicy::sequenced());
    }

    #[test]
    fn backoff_is_linear() {
        assert_eq!(linear_backoff_ms(1, 100), 100);
        assert_eq!(linear_backoff_ms(2, 100), 200);
        assert_eq!(linear_backoff_ms(7, 100), 700);
        assert_eq!(linear_backoff_ms(3, 250), 750);
    }

    #[test]
    fn backoff_saturates() {
        assert_eq!(linear_backoff_ms(u32::MAX, u64::MAX), u64::MAX);
    }

    #[test]
    fn budget_boundaries() {
        let policy = RetryPolicy::element();
        assert!(policy.allows_retry_after(1));
        assert!(policy.allows_retry_after(2));
        assert!(!policy.allows_retry_after(3));
    }

    #[test]
    fn retry_after_hint_extends_delay() {
        let policy = RetryPolicy::sequenced();
        let hinted = TransportError::RateLimited {
            message: String::new(),
            retry_after_ms: Some(1_000),
        };
        assert_eq!(policy.delay_for(2, &hinted), Duration::from_millis(1_000));

        let short_hint = TransportError::RateLimited {
            message: String::new(),
            retry_after_ms: Some(10),
        };
        assert_eq!(policy.delay_for(2, &short_hint), Duration::from_millis(200));
    }

    #[test]
    fn serde_roundtrip_camel_case() {
        let json = serde_json::to_value(RetryPolicy::element()).unwrap();
        assert_eq!(json["maxAttempts"], 3);
        assert_eq!(json["baseDelayMs"], 250);
        let back: RetryPolicy = serde_json::from_value(json).unwrap();
        assert_eq!(back, RetryPolicy::element());
    }
}
