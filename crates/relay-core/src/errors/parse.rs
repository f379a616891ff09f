//! Error string classification.
//!
//! Remote messaging surfaces report failures in many shapes: status codes,
//! numeric business codes, socket error names. [`classify_message`] matches an
//! error string against an ordered pattern table and returns the first
//! matching [`ErrorCategory`].

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Error category for classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Stale or out-of-order sequence number.
    SequenceConflict,
    /// Rate limit exceeded.
    RateLimit,
    /// Timeouts, refused or reset connections.
    Network,
    /// Server-side errors (5xx).
    Server,
    /// Malformed request (4xx).
    InvalidRequest,
    /// Missing permission or invalid credentials.
    Authorization,
    /// Target entity or message no longer exists.
    NotFound,
    /// Unrecognized error.
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SequenceConflict => write!(f, "sequence_conflict"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Network => write!(f, "network"),
            Self::Server => write!(f, "server"),
            Self::InvalidRequest => write!(f, "invalid_request"),
            Self::Authorization => write!(f, "authorization"),
            Self::NotFound => write!(f, "not_found"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pattern matching
// ─────────────────────────────────────────────────────────────────────────────

struct ErrorPattern {
    check: fn(&str) -> bool,
    category: ErrorCategory,
}

/// All known error patterns, checked in order against the lowercased message.
fn patterns() -> &'static [ErrorPattern] {
    static PATTERNS: &[ErrorPattern] = &[
        // Ordering conflicts come first: surfaces often wrap them in a 400.
        ErrorPattern {
            check: |s| s.contains("sequence") && (s.contains("compare") || s.contains("stale")),
            category: ErrorCategory::SequenceConflict,
        },
        ErrorPattern {
            check: |s| s.contains("out of order") || s.contains("sequence conflict"),
            category: ErrorCategory::SequenceConflict,
        },
        // Rate limiting
        ErrorPattern {
            check: |s| s.contains("429") || s.contains("too many requests"),
            category: ErrorCategory::RateLimit,
        },
        ErrorPattern {
            check: |s| (s.contains("rate") && s.contains("limit")) || s.contains("frequency limit"),
            category: ErrorCategory::RateLimit,
        },
        // Network
        ErrorPattern {
            check: |s| {
                s.contains("etimedout") || s.contains("timed out") || s.contains("timeout")
            },
            category: ErrorCategory::Network,
        },
        ErrorPattern {
            check: |s| {
                s.contains("econnreset")
                    || s.contains("econnrefused")
                    || s.contains("connection reset")
                    || s.contains("socket hang up")
            },
            category: ErrorCategory::Network,
        },
        // Server
        ErrorPattern {
            check: |s| {
                ["500", "502", "503", "504"].iter().any(|code| s.contains(code))
                    || s.contains("internal server error")
                    || s.contains("service unavailable")
            },
            category: ErrorCategory::Server,
        },
        // Authorization
        ErrorPattern {
            check: |s| {
                s.contains("401")
                    || s.contains("403")
                    || s.contains("permission")
                    || s.contains("forbidden")
                    || s.contains("unauthorized")
            },
            category: ErrorCategory::Authorization,
        },
        // Not found
        ErrorPattern {
            check: |s| s.contains("404") || s.contains("not found") || s.contains("not exist"),
            category: ErrorCategory::NotFound,
        },
        // Invalid request
        ErrorPattern {
            check: |s| s.contains("400") || s.contains("bad request") || s.contains("invalid"),
            category: ErrorCategory::InvalidRequest,
        },
    ];
    PATTERNS
}

/// Classify an error string.
///
/// Returns [`ErrorCategory::Unknown`] when no pattern matches.
#[must_use]
pub fn classify_message(message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();
    patterns()
        .iter()
        .find(|p| (p.check)(&lower))
        .map_or(ErrorCategory::Unknown, |p| p.category)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_conflict_patterns() {
        assert_eq!(
            classify_message("code 300317: Sequence number compare failed"),
            ErrorCategory::SequenceConflict
        );
        assert_eq!(
            classify_message("400 Bad Request: stale sequence"),
            ErrorCategory::SequenceConflict
        );
        assert_eq!(
            classify_message("edit arrived out of order"),
            ErrorCategory::SequenceConflict
        );
    }

    #[test]
    fn rate_limit_patterns() {
        assert_eq!(classify_message("HTTP 429"), ErrorCategory::RateLimit);
        assert_eq!(classify_message("Rate limit exceeded"), ErrorCategory::RateLimit);
        assert_eq!(
            classify_message("request trigger frequency limit"),
            ErrorCategory::RateLimit
        );
    }

    #[test]
    fn network_patterns() {
        assert_eq!(classify_message("connect ETIMEDOUT"), ErrorCategory::Network);
        assert_eq!(classify_message("read ECONNRESET"), ErrorCategory::Network);
        assert_eq!(classify_message("socket hang up"), ErrorCategory::Network);
    }

    #[test]
    fn server_patterns() {
        assert_eq!(classify_message("502 Bad Gateway"), ErrorCategory::Server);
        assert_eq!(classify_message("Service Unavailable"), ErrorCategory::Server);
    }

    #[test]
    fn permanent_patterns() {
        assert_eq!(classify_message("403 Forbidden"), ErrorCategory::Authorization);
        assert_eq!(classify_message("message not found"), ErrorCategory::NotFound);
        assert_eq!(classify_message("invalid card json"), ErrorCategory::InvalidRequest);
    }

    #[test]
    fn unknown_fallback() {
        assert_eq!(classify_message("the moon is made of cheese"), ErrorCategory::Unknown);
        assert_eq!(classify_message(""), ErrorCategory::Unknown);
    }

    #[test]
    fn category_display_matches_serde() {
        let json = serde_json::to_string(&ErrorCategory::SequenceConflict).unwrap();
        assert_eq!(json, "\"sequence_conflict\"");
        assert_eq!(ErrorCategory::SequenceConflict.to_string(), "sequence_conflict");
        assert_eq!(ErrorCategory::RateLimit.to_string(), "rate_limit");
    }
}
