//! Mutation queue: one-at-a-time transport calls via MPSC serialization.
//!
//! Every entity-mutating call of a session goes through a single worker task
//! draining a channel, so at most one transport call per session is ever in
//! flight. The worker owns the retry loop and the sequence bookkeeping:
//!
//! - a mutation whose target entity is no longer current is skipped
//! - sequence-carrying mutations take `committed + 1` and commit on success only
//! - an ordering conflict fast-forwards the ledger to the attempted number
//! - transient failures back off linearly (or by the remote's retry-after hint)

use std::sync::Arc;

use relay_core::{EntityId, MessageId, RetryClass, RetryPolicy, TransportError};
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, warn};

use crate::clock::Clock;
use crate::errors::MutationError;
use crate::ledger::{SequenceLedger, SharedLedger};
use crate::transport::{DeliveryTarget, EntityTransport};

const QUEUE_CAPACITY: usize = 64;

/// One remote mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    /// Create a rich entity with initial content.
    CreateEntity {
        /// Initial content.
        content: String,
    },
    /// Wrap an entity in a message.
    BindEntity {
        /// Entity to bind.
        entity: EntityId,
        /// Conversation and reply target.
        target: DeliveryTarget,
    },
    /// Replace an entity's content.
    UpdateContent {
        /// Target entity.
        entity: EntityId,
        /// New content.
        content: String,
    },
    /// Set an entity's summary alongside its content.
    UpdateSummary {
        /// Target entity.
        entity: EntityId,
        /// Summary text.
        summary: String,
        /// Content to keep.
        content: String,
    },
    /// Finish an entity's streaming.
    CloseEntity {
        /// Target entity.
        entity: EntityId,
    },
    /// Delete a message.
    DeleteMessage {
        /// Message to delete.
        message: MessageId,
    },
    /// Send an ordinary message.
    SendPlain {
        /// Message text.
        text: String,
        /// Conversation and reply target.
        target: DeliveryTarget,
    },
    /// Edit an ordinary message.
    EditPlain {
        /// Message to edit.
        message: MessageId,
        /// Replacement text.
        text: String,
    },
}

impl Mutation {
    /// Stable name used in logs, errors, and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateEntity { .. } => "create_entity",
            Self::BindEntity { .. } => "bind_entity",
            Self::UpdateContent { .. } => "update_content",
            Self::UpdateSummary { .. } => "update_summary",
            Self::CloseEntity { .. } => "close_entity",
            Self::DeleteMessage { .. } => "delete_message",
            Self::SendPlain { .. } => "send_plain",
            Self::EditPlain { .. } => "edit_plain",
        }
    }

    /// Entity that must still be current when the mutation runs.
    pub fn target_entity(&self) -> Option<&EntityId> {
        match self {
            Self::BindEntity { entity, .. }
            | Self::UpdateContent { entity, .. }
            | Self::UpdateSummary { entity, .. }
            | Self::CloseEntity { entity } => Some(entity),
            Self::CreateEntity { .. }
            | Self::DeleteMessage { .. }
            | Self::SendPlain { .. }
            | Self::EditPlain { .. } => None,
        }
    }

    /// Whether the call carries a sequence number.
    pub fn is_sequenced(&self) -> bool {
        matches!(
            self,
            Self::UpdateContent { .. } | Self::UpdateSummary { .. } | Self::CloseEntity { .. }
        )
    }
}

/// Successful result of a mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Entity created; the ledger now targets it.
    Created {
        /// New entity.
        entity: EntityId,
    },
    /// Entity wrapped in a message.
    Bound {
        /// Wrapping message.
        message: MessageId,
    },
    /// Plain message sent.
    Sent {
        /// New message.
        message: MessageId,
    },
    /// Call applied.
    Applied {
        /// Sequence number committed, for sequenced calls.
        sequence: Option<u64>,
    },
    /// Target entity was retired before the mutation ran.
    Skipped,
}

/// Resolves when one specific mutation finishes.
#[derive(Debug)]
pub struct MutationHandle {
    rx: oneshot::Receiver<Result<MutationOutcome, MutationError>>,
}

impl MutationHandle {
    /// Wait for the mutation's final result.
    pub async fn outcome(self) -> Result<MutationOutcome, MutationError> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(MutationError::QueueClosed))
    }
}

/// Request sent to the mutation worker.
struct Job {
    mutation: Mutation,
    policy: RetryPolicy,
    reply: oneshot::Sender<Result<MutationOutcome, MutationError>>,
}

/// Linearized mutation pipeline for one session.
pub struct MutationQueue {
    tx: mpsc::Sender<Job>,
    ledger: SharedLedger,
    worker_handle: tokio::task::JoinHandle<()>,
}

impl MutationQueue {
    /// Spawn the worker task in the current span.
    pub fn new(transport: Arc<dyn EntityTransport>, clock: Arc<dyn Clock>) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let ledger = SequenceLedger::shared();
        let worker_handle = tokio::spawn(
            mutation_worker(rx, transport, clock, Arc::clone(&ledger)).in_current_span(),
        );
        Self {
            tx,
            ledger,
            worker_handle,
        }
    }

    /// Queue a mutation behind everything already queued.
    pub async fn enqueue(&self, mutation: Mutation, policy: RetryPolicy) -> MutationHandle {
        let (reply, rx) = oneshot::channel();
        let job = Job {
            mutation,
            policy,
            reply,
        };
        if let Err(mpsc::error::SendError(job)) = self.tx.send(job).await {
            warn!(
                operation = job.mutation.name(),
                worker_exited = self.worker_handle.is_finished(),
                "mutation queue closed"
            );
            let _ = job.reply.send(Err(MutationError::QueueClosed));
        }
        MutationHandle { rx }
    }

    /// Queue a mutation and wait for its result.
    pub async fn run(
        &self,
        mutation: Mutation,
        policy: RetryPolicy,
    ) -> Result<MutationOutcome, MutationError> {
        self.enqueue(mutation, policy).await.outcome().await
    }

    /// Stop targeting the current entity; its queued mutations are skipped.
    pub fn retire(&self) {
        self.ledger.lock().retire();
    }

    /// Last committed sequence number of the current entity.
    pub fn committed_sequence(&self) -> u64 {
        self.ledger.lock().committed()
    }

    /// Ledger shared with the worker.
    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }
}

/// Background worker that runs mutations sequentially.
async fn mutation_worker(
    mut rx: mpsc::Receiver<Job>,
    transport: Arc<dyn EntityTransport>,
    clock: Arc<dyn Clock>,
    ledger: SharedLedger,
) {
    while let Some(job) = rx.recv().await {
        let result = run_with_retry(
            transport.as_ref(),
            clock.as_ref(),
            &ledger,
            &job.mutation,
            job.policy,
        )
        .await;
        let _ = job.reply.send(result);
    }
    debug!("mutation worker stopped");
}

fn is_stale(ledger: &SharedLedger, mutation: &Mutation) -> bool {
    mutation
        .target_entity()
        .is_some_and(|entity| !ledger.lock().is_current(entity))
}

async fn run_with_retry(
    transport: &dyn EntityTransport,
    clock: &dyn Clock,
    ledger: &SharedLedger,
    mutation: &Mutation,
    policy: RetryPolicy,
) -> Result<MutationOutcome, MutationError> {
    let operation = mutation.name();
    let mut attempt: u32 = 0;
    loop {
        if is_stale(ledger, mutation) {
            debug!(operation, "skipping mutation for retired entity");
            return Ok(MutationOutcome::Skipped);
        }
        attempt += 1;
        let sequence = if mutation.is_sequenced() {
            Some(ledger.lock().next_sequence())
        } else {
            None
        };

        let err = match execute(transport, mutation, sequence).await {
            Ok(outcome) => {
                settle(ledger, sequence, &outcome);
                return Ok(outcome);
            }
            Err(err) => err,
        };

        let class = err.retry_class();
        if class == RetryClass::Permanent {
            return Err(MutationError::Rejected {
                operation,
                source: err,
            });
        }
        if !policy.allows_retry_after(attempt) {
            return Err(MutationError::Exhausted {
                operation,
                attempts: attempt,
                source: err,
            });
        }
        if let (RetryClass::Ordering, Some(attempted)) = (class, sequence) {
            ledger.lock().fast_forward(attempted);
        }

        let delay = policy.delay_for(attempt, &err);
        let category = err.category();
        metrics::counter!("stream_mutation_retries_total", "category" => category.to_string())
            .increment(1);
        warn!(
            operation,
            attempt,
            sequence,
            %category,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "mutation failed, retrying"
        );
        clock.sleep(delay).await;
    }
}

fn settle(ledger: &SharedLedger, sequence: Option<u64>, outcome: &MutationOutcome) {
    let mut ledger = ledger.lock();
    if let Some(sequence) = sequence {
        ledger.commit(sequence);
    }
    if let MutationOutcome::Created { entity } = outcome {
        ledger.activate(entity.clone());
    }
}

async fn execute(
    transport: &dyn EntityTransport,
    mutation: &Mutation,
    sequence: Option<u64>,
) -> Result<MutationOutcome, TransportError> {
    let applied = MutationOutcome::Applied { sequence };
    let seq = sequence.unwrap_or_default();
    match mutation {
        Mutation::CreateEntity { content } => transport
            .create_entity(content)
            .await
            .map(|entity| MutationOutcome::Created { entity }),
        Mutation::BindEntity { entity, target } => transport
            .bind_entity_to_message(entity, target)
            .await
            .map(|message| MutationOutcome::Bound { message }),
        Mutation::UpdateContent { entity, content } => transport
            .update_entity_content(entity, content, seq)
            .await
            .map(|()| applied),
        Mutation::UpdateSummary {
            entity,
            summary,
            content,
        } => transport
            .update_entity_summary(entity, summary, content, seq)
            .await
            .map(|()| applied),
        Mutation::CloseEntity { entity } => {
            transport.close_entity(entity, seq).await.map(|()| applied)
        }
        Mutation::DeleteMessage { message } => {
            transport.delete_message(message).await.map(|()| applied)
        }
        Mutation::SendPlain { text, target } => transport
            .send_plain_message(text, target)
            .await
            .map(|message| MutationOutcome::Sent { message }),
        Mutation::EditPlain { message, text } => transport
            .edit_plain_message(message, text)
            .await
            .map(|()| applied),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
