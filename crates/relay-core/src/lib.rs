//! # relay-core
//!
//! Foundation types shared by the relay streaming crates:
//!
//! - **Branded IDs**: `EntityId`, `MessageId`, `ConversationId`, `SessionId` as newtypes for type safety
//! - **Errors**: `TransportError` taxonomy with retry classification, plus a
//!   string classifier for transports that only see opaque error text
//! - **Retry**: `RetryPolicy` budgets and linear backoff math
//! - **Logging**: `tracing` subscriber bootstrap and log capture for tests

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod retry;

pub use errors::{ErrorCategory, RetryClass, TransportError};
pub use ids::{ConversationId, EntityId, MessageId, SessionId};
pub use retry::RetryPolicy;
