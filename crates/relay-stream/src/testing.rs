//! In-memory transport for tests.
//!
//! [`RecordingTransport`] records every call (including failed attempts),
//! replays scripted failures, enforces the remote's strictly-increasing
//! sequence rule per entity, and tracks how many calls overlap in time.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::{EntityId, MessageId, TransportError};

use crate::transport::{DeliveryTarget, EntityTransport};

/// Transport operation kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `create_entity`
    CreateEntity,
    /// `bind_entity_to_message`
    BindEntity,
    /// `update_entity_content`
    UpdateContent,
    /// `update_entity_summary`
    UpdateSummary,
    /// `close_entity`
    CloseEntity,
    /// `delete_message`
    DeleteMessage,
    /// `send_plain_message`
    SendPlain,
    /// `edit_plain_message`
    EditPlain,
}

/// One observed transport call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedCall {
    /// Operation invoked.
    pub operation: Operation,
    /// Entity involved, if any.
    pub entity: Option<EntityId>,
    /// Message involved, if any.
    pub message: Option<MessageId>,
    /// Content or text carried.
    pub text: Option<String>,
    /// Sequence number carried.
    pub sequence: Option<u64>,
    /// Whether the call succeeded.
    pub succeeded: bool,
}

impl RecordedCall {
    fn new(operation: Operation) -> Self {
        Self {
            operation,
            entity: None,
            message: None,
            text: None,
            sequence: None,
            succeeded: false,
        }
    }
}

/// Recording fake of the remote messaging surface.
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<RecordedCall>>,
    scripted: Mutex<HashMap<Operation, VecDeque<TransportError>>>,
    persistent: Mutex<HashMap<Operation, TransportError>>,
    remote_sequences: Mutex<HashMap<EntityId, u64>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    next_entity: AtomicU64,
    next_message: AtomicU64,
}

impl RecordingTransport {
    /// Transport answering instantly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call take `latency` (tokio time).
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next call of `operation` with `error`. Calls queue up.
    pub fn fail_next(&self, operation: Operation, error: TransportError) {
        self.scripted
            .lock()
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Fail every call of `operation` with `error`.
    pub fn fail_always(&self, operation: Operation, error: TransportError) {
        let _ = self.persistent.lock().insert(operation, error);
    }

    /// Drop all scripted and persistent failures.
    pub fn clear_failures(&self) {
        self.scripted.lock().clear();
        self.persistent.lock().clear();
    }

    /// Pretend the remote already accepted `sequence` for `entity`.
    pub fn set_remote_sequence(&self, entity: &EntityId, sequence: u64) {
        let _ = self.remote_sequences.lock().insert(entity.clone(), sequence);
    }

    /// Every call observed, in completion order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Attempts of `operation`, successful or not.
    pub fn count(&self, operation: Operation) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Successful calls of `operation`.
    pub fn successful(&self, operation: Operation) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.operation == operation && c.succeeded)
            .cloned()
            .collect()
    }

    /// Sequence numbers the remote accepted for `entity`, in order.
    pub fn accepted_sequences(&self, entity: &EntityId) -> Vec<u64> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.succeeded && c.entity.as_ref() == Some(entity))
            .filter_map(|c| c.sequence)
            .collect()
    }

    /// Content the entity currently shows.
    pub fn rendered_text(&self, entity: &EntityId) -> Option<String> {
        self.calls
            .lock()
            .iter()
            .rev()
            .find(|c| {
                c.succeeded
                    && c.entity.as_ref() == Some(entity)
                    && matches!(
                        c.operation,
                        Operation::CreateEntity | Operation::UpdateContent | Operation::UpdateSummary
                    )
            })
            .and_then(|c| c.text.clone())
    }

    /// Highest number of calls observed overlapping in time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_failure(&self, operation: Operation) -> Option<TransportError> {
        if let Some(err) = self
            .scripted
            .lock()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            return Some(err);
        }
        self.persistent.lock().get(&operation).cloned()
    }

    fn check_sequence(&self, call: &RecordedCall) -> Result<(), TransportError> {
        let (Some(entity), Some(sequence)) = (&call.entity, call.sequence) else {
            return Ok(());
        };
        let mut remote = self.remote_sequences.lock();
        let last = remote.entry(entity.clone()).or_insert(0);
        if sequence <= *last {
            return Err(TransportError::SequenceConflict {
                message: format!("sequence {sequence} not greater than {last}"),
            });
        }
        *last = sequence;
        Ok(())
    }

    async fn perform(&self, mut call: RecordedCall) -> Result<(), TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let result = match self.next_failure(call.operation) {
            Some(err) => Err(err),
            None => self.check_sequence(&call),
        };
        let _ = self.in_flight.fetch_sub(1, Ordering::SeqCst);
        call.succeeded = result.is_ok();
        self.calls.lock().push(call);
        result
    }
}

#[async_trait]
impl EntityTransport for RecordingTransport {
    async fn create_entity(&self, content: &str) -> Result<EntityId, TransportError> {
        let n = self.next_entity.fetch_add(1, Ordering::SeqCst) + 1;
        let entity = EntityId::from(format!("entity-{n}"));
        let mut call = RecordedCall::new(Operation::CreateEntity);
        call.entity = Some(entity.clone());
        call.text = Some(content.to_owned());
        self.perform(call).await.map(|()| entity)
    }

    async fn bind_entity_to_message(
        &self,
        entity: &EntityId,
        _target: &DeliveryTarget,
    ) -> Result<MessageId, TransportError> {
        let n = self.next_message.fetch_add(1, Ordering::SeqCst) + 1;
        let message = MessageId::from(format!("message-{n}"));
        let mut call = RecordedCall::new(Operation::BindEntity);
        call.entity = Some(entity.clone());
        call.message = Some(message.clone());
        self.perform(call).await.map(|()| message)
    }

    async fn update_entity_content(
        &self,
        entity: &EntityId,
        content: &str,
        sequence: u64,
    ) -> Result<(), TransportError> {
        let mut call = RecordedCall::new(Operation::UpdateContent);
        call.entity = Some(entity.clone());
        call.text = Some(content.to_owned());
        call.sequence = Some(sequence);
        self.perform(call).await
    }

    async fn update_entity_summary(
        &self,
        entity: &EntityId,
        _summary: &str,
        content: &str,
        sequence: u64,
    ) -> Result<(), TransportError> {
        let mut call = RecordedCall::new(Operation::UpdateSummary);
        call.entity = Some(entity.clone());
        call.text = Some(content.to_owned());
        call.sequence = Some(sequence);
        self.perform(call).await
    }

    async fn close_entity(&self, entity: &EntityId, sequence: u64) -> Result<(), TransportError> {
        let mut call = RecordedCall::new(Operation::CloseEntity);
        call.entity = Some(entity.clone());
        call.sequence = Some(sequence);
        self.perform(call).await
    }

    async fn delete_message(&self, message: &MessageId) -> Result<(), TransportError> {
        let mut call = RecordedCall::new(Operation::DeleteMessage);
        call.message = Some(message.clone());
        self.perform(call).await
    }

    async fn send_plain_message(
        &self,
        text: &str,
        _target: &DeliveryTarget,
    ) -> Result<MessageId, TransportError> {
        let n = self.next_message.fetch_add(1, Ordering::SeqCst) + 1;
        let message = MessageId::from(format!("message-{n}"));
        let mut call = RecordedCall::new(Operation::SendPlain);
        call.message = Some(message.clone());
        call.text = Some(text.to_owned());
        self.perform(call).await.map(|()| message)
    }

    async fn edit_plain_message(&self, message: &MessageId, text: &str) -> Result<(), TransportError> {
        let mut call = RecordedCall::new(Operation::EditPlain);
        call.message = Some(message.clone());
        call.text = Some(text.to_owned());
        self.perform(call).await
    }
}
