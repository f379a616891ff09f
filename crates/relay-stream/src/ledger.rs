//! Per-entity sequence bookkeeping.
//!
//! The remote surface accepts an edit only if its sequence number is strictly
//! greater than the last one it saw for that entity. The ledger tracks which
//! entity the mutation queue currently targets and the last sequence number
//! committed against it. Numbers are committed only after a call succeeds,
//! except for the fast-forward after an ordering conflict.

use std::sync::Arc;

use parking_lot::Mutex;
use relay_core::EntityId;

/// Ledger shared between the session and its mutation queue.
pub type SharedLedger = Arc<Mutex<SequenceLedger>>;

/// Active entity plus its committed sequence number.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SequenceLedger {
    entity: Option<EntityId>,
    committed: u64,
}

impl SequenceLedger {
    /// Create an empty ledger behind a shared lock.
    #[must_use]
    pub fn shared() -> SharedLedger {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Target a freshly created entity. Creation counts as sequence 0.
    pub fn activate(&mut self, entity: EntityId) {
        self.entity = Some(entity);
        self.committed = 0;
    }

    /// Stop targeting any entity.
    pub fn retire(&mut self) {
        self.entity = None;
        self.committed = 0;
    }

    /// Whether `entity` is the currently targeted entity.
    #[must_use]
    pub fn is_current(&self, entity: &EntityId) -> bool {
        self.entity.as_ref() == Some(entity)
    }

    /// Sequence number the next attempt should carry.
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.committed + 1
    }

    /// Last committed sequence number.
    #[must_use]
    pub fn committed(&self) -> u64 {
        self.committed
    }

    /// Record a successful call carrying `sequence`.
    pub fn commit(&mut self, sequence: u64) {
        self.committed = self.committed.max(sequence);
    }

    /// Assume the remote is already at `sequence` after an ordering conflict.
    pub fn fast_forward(&mut self, sequence: u64) {
        self.committed = self.committed.max(sequence);
    }
}
