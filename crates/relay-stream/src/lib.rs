//! # relay-stream
//!
//! Streaming delivery controller. Takes an incrementally growing text output
//! (an LLM generation stream) and keeps a single remote message entity in sync
//! with it, on a surface that demands strictly increasing per-entity sequence
//! numbers and tolerates only one mutation in flight.
//!
//! - **Filter**: non-regression predicate and noise-token guard
//! - **Divergence**: streak tracking that arms segment rotation
//! - **Queue**: single worker task draining mutations with retry and sequence bookkeeping
//! - **Throttle**: one timer per session coalescing snapshots into one update per window
//! - **Session**: explicit per-session state record with named transitions
//! - **Lifecycle**: segment creation, update, rotation, finalize, and cleanup
//! - **Controller**: the caller-facing facade running the session actor

#![deny(unsafe_code)]

pub mod clock;
pub mod controller;
pub mod divergence;
pub mod errors;
pub mod filter;
pub mod ledger;
mod lifecycle;
pub mod queue;
pub mod session;
pub mod testing;
pub mod throttle;
pub mod transport;
pub mod types;

pub use clock::{Clock, TokioClock};
pub use controller::{ControllerBuilder, StreamingController};
pub use errors::MutationError;
pub use filter::SnapshotFilter;
pub use queue::{Mutation, MutationHandle, MutationOutcome, MutationQueue};
pub use relay_settings::RenderSurface;
pub use session::{BackendState, StreamSession};
pub use transport::{DeliveryTarget, EntityTransport};
pub use types::{FinalizeOutcome, SegmentCallback, SegmentCause, SegmentFinalized, StreamStats};
