//! Mutation pipeline errors.

use relay_core::{ErrorCategory, TransportError};

/// Final failure of a queued mutation.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum MutationError {
    /// The transport rejected the call with a non-retryable error.
    #[error("{operation} rejected: {source}")]
    Rejected {
        /// Mutation name.
        operation: &'static str,
        /// Transport failure.
        #[source]
        source: TransportError,
    },

    /// Every attempt in the retry budget failed.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    Exhausted {
        /// Mutation name.
        operation: &'static str,
        /// Attempts made.
        attempts: u32,
        /// Last transport failure.
        #[source]
        source: TransportError,
    },

    /// The queue worker is gone.
    #[error("mutation queue closed")]
    QueueClosed,
}

impl MutationError {
    /// Category of the underlying transport failure, if any.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Rejected { source, .. } | Self::Exhausted { source, .. } => {
                Some(source.category())
            }
            Self::QueueClosed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_operation_and_attempts() {
        let err = MutationError::Exhausted {
            operation: "update_content",
            attempts: 8,
            source: TransportError::Timeout {
                message: "deadline".into(),
            },
        };
        let text = err.to_string();
        assert!(text.contains("update_content"));
        assert!(text.contains("8 attempts"));
        assert_eq!(err.category(), Some(ErrorCategory::Network));
    }

    #[test]
    fn queue_closed_has_no_category() {
        assert_eq!(MutationError::QueueClosed.category(), None);
    }
}
