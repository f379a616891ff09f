//! Transport error taxonomy.
//!
//! Every call against the remote messaging surface can fail with a
//! [`TransportError`]. The mutation pipeline only needs to know which of three
//! buckets a failure falls into:
//!
//! - [`RetryClass::Ordering`]: the remote rejected a stale sequence number;
//!   retried after fast-forwarding the local counter
//! - [`RetryClass::Transient`]: rate limits, timeouts, resets, 5xx; retried with
//!   linear backoff
//! - [`RetryClass::Permanent`]: bad request, permission, not found; never retried
//!
//! Transports that only see opaque error strings can build typed errors with
//! [`TransportError::from_message`], which runs the pattern table in [`parse`].

pub mod parse;

use thiserror::Error;

pub use parse::{ErrorCategory, classify_message};

/// How the mutation pipeline should react to a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryClass {
    /// Stale sequence number. Retry with the local counter fast-forwarded.
    Ordering,
    /// Temporary failure. Retry with backoff.
    Transient,
    /// Do not retry.
    Permanent,
}

/// Errors returned by the remote messaging surface.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    /// The supplied sequence number is stale or out of order.
    #[error("sequence conflict: {message}")]
    SequenceConflict {
        /// Error description.
        message: String,
    },

    /// The remote surface throttled the request.
    #[error("rate limited: {message}")]
    RateLimited {
        /// Error description.
        message: String,
        /// Suggested retry delay in milliseconds, when the remote supplied one.
        retry_after_ms: Option<u64>,
    },

    /// The request timed out.
    #[error("timeout: {message}")]
    Timeout {
        /// Error description.
        message: String,
    },

    /// The connection was refused or reset.
    #[error("connection error: {message}")]
    Connection {
        /// Error description.
        message: String,
    },

    /// The remote surface returned a 5xx-class failure.
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP-like status code.
        status: u16,
        /// Error description.
        message: String,
    },

    /// The remote surface rejected the request.
    #[error("api error ({status}): {message}")]
    Api {
        /// HTTP-like status code.
        status: u16,
        /// Surface-specific error code.
        code: Option<String>,
        /// Error description.
        message: String,
    },

    /// Anything the transport could not classify.
    #[error("{message}")]
    Other {
        /// Error description.
        message: String,
    },
}

impl TransportError {
    /// Build a typed error from an opaque error string.
    #[must_use]
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        match classify_message(&message) {
            ErrorCategory::SequenceConflict => Self::SequenceConflict { message },
            ErrorCategory::RateLimit => Self::RateLimited {
                message,
                retry_after_ms: None,
            },
            ErrorCategory::Network => Self::Connection { message },
            ErrorCategory::Server => Self::Server {
                status: 500,
                message,
            },
            ErrorCategory::InvalidRequest => Self::Api {
                status: 400,
                code: None,
                message,
            },
            ErrorCategory::Authorization => Self::Api {
                status: 403,
                code: None,
                message,
            },
            ErrorCategory::NotFound => Self::Api {
                status: 404,
                code: None,
                message,
            },
            ErrorCategory::Unknown => Self::Other { message },
        }
    }

    /// Error category for logging and metrics labels.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SequenceConflict { .. } => ErrorCategory::SequenceConflict,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Timeout { .. } | Self::Connection { .. } => ErrorCategory::Network,
            Self::Server { .. } => ErrorCategory::Server,
            Self::Api { status: 429, .. } => ErrorCategory::RateLimit,
            Self::Api { status, .. } if *status >= 500 => ErrorCategory::Server,
            Self::Api { status: 401 | 403, .. } => ErrorCategory::Authorization,
            Self::Api { status: 404, .. } => ErrorCategory::NotFound,
            Self::Api { message, .. } | Self::Other { message } => {
                match classify_message(message) {
                    ErrorCategory::Unknown if matches!(self, Self::Api { .. }) => {
                        ErrorCategory::InvalidRequest
                    }
                    other => other,
                }
            }
        }
    }

    /// Retry bucket for this failure.
    #[must_use]
    pub fn retry_class(&self) -> RetryClass {
        match self.category() {
            ErrorCategory::SequenceConflict => RetryClass::Ordering,
            ErrorCategory::RateLimit | ErrorCategory::Network | ErrorCategory::Server => {
                RetryClass::Transient
            }
            ErrorCategory::InvalidRequest
            | ErrorCategory::Authorization
            | ErrorCategory::NotFound
            | ErrorCategory::Unknown => RetryClass::Permanent,
        }
    }

    /// Whether the mutation pipeline may retry this failure.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.retry_class() != RetryClass::Permanent
    }

    /// Retry-after hint supplied by the remote, in milliseconds.
    #[must_use]
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_conflict_is_ordering() {
        let err = TransportError::SequenceConflict {
            message: "stale".into(),
        };
        assert_eq!(err.retry_class(), RetryClass::Ordering);
        assert!(err.is_retryable());
    }

    #[test]
    fn transient_variants() {
        let errors = [
            TransportError::RateLimited {
                message: "slow down".into(),
                retry_after_ms: Some(1000),
            },
            TransportError::Timeout {
                message: "deadline".into(),
            },
            TransportError::Connection {
                message: "reset".into(),
            },
            TransportError::Server {
                status: 503,
                message: "unavailable".into(),
            },
        ];
        for err in errors {
            assert_eq!(err.retry_class(), RetryClass::Transient, "{err}");
        }
    }

    #[test]
    fn api_status_mapping() {
        let api = |status| TransportError::Api {
            status,
            code: None,
            message: "nope".into(),
        };
        assert_eq!(api(429).retry_class(), RetryClass::Transient);
        assert_eq!(api(502).retry_class(), RetryClass::Transient);
        assert_eq!(api(400).retry_class(), RetryClass::Permanent);
        assert_eq!(api(403).category(), ErrorCategory::Authorization);
        assert_eq!(api(404).category(), ErrorCategory::NotFound);
    }

    #[test]
    fn api_message_can_reveal_sequence_conflict() {
        let err = TransportError::Api {
            status: 400,
            code: Some("300317".into()),
            message: "sequence number compare failed".into(),
        };
        assert_eq!(err.retry_class(), RetryClass::Ordering);
    }

    #[test]
    fn from_message_builds_typed_error() {
        assert!(matches!(
            TransportError::from_message("HTTP 429 Too Many Requests"),
            TransportError::RateLimited { .. }
        ));
        assert!(matches!(
            TransportError::from_message("read ECONNRESET"),
            TransportError::Connection { .. }
        ));
        assert!(matches!(
            TransportError::from_message("something odd"),
            TransportError::Other { .. }
        ));
    }

    #[test]
    fn unknown_other_is_permanent() {
        let err = TransportError::Other {
            message: "card schema invalid".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn retry_after_only_on_rate_limit() {
        let err = TransportError::RateLimited {
            message: String::new(),
            retry_after_ms: Some(750),
        };
        assert_eq!(err.retry_after_ms(), Some(750));
        let err = TransportError::Timeout {
            message: String::new(),
        };
        assert_eq!(err.retry_after_ms(), None);
    }
}
