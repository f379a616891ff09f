//! Segment lifecycle.
//!
//! [`SessionWorker`] drives one session's segments through
//! create → update* → close, rotates into a fresh segment when an armed
//! divergence reaches a flush, and runs the finalize and cleanup paths. Every
//! transport call goes through the session's [`MutationQueue`] and is awaited
//! before the next one is issued, so a closing entity never interleaves with
//! the entity replacing it.

use std::sync::Arc;
use std::time::Duration;

use relay_core::RetryPolicy;
use relay_settings::{RenderSurface, StreamingSettings};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::divergence::DivergenceVerdict;
use crate::errors::MutationError;
use crate::queue::{Mutation, MutationOutcome, MutationQueue};
use crate::session::{Delivery, OfferOutcome, StreamSession};
use crate::throttle::Throttle;
use crate::transport::{DeliveryTarget, EntityTransport};
use crate::types::{
    FinalizeOutcome, SegmentCallback, SegmentCause, SegmentFinalized, StreamStats,
};

/// Collapse whitespace runs and keep the first `max_chars` characters.
pub(crate) fn summarize(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max_chars).collect()
}

/// Owner of one session's state, timer, and mutation queue.
pub(crate) struct SessionWorker {
    session: StreamSession,
    queue: MutationQueue,
    throttle: Throttle,
    settings: StreamingSettings,
    target: DeliveryTarget,
    clock: Arc<dyn Clock>,
    on_segment_finalized: Option<SegmentCallback>,
}

impl SessionWorker {
    /// Must be called inside a tokio runtime; spawns the mutation worker.
    pub(crate) fn new(
        transport: Arc<dyn EntityTransport>,
        clock: Arc<dyn Clock>,
        settings: StreamingSettings,
        target: DeliveryTarget,
        on_segment_finalized: Option<SegmentCallback>,
    ) -> Self {
        Self {
            session: StreamSession::new(settings.render_surface, &settings.filter),
            queue: MutationQueue::new(transport, Arc::clone(&clock)),
            throttle: Throttle::new(Duration::from_millis(settings.throttle_ms)),
            settings,
            target,
            clock,
            on_segment_finalized,
        }
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.throttle.deadline()
    }

    pub(crate) fn stats(&self) -> StreamStats {
        self.session.stats()
    }

    fn policies(&self) -> (RetryPolicy, RetryPolicy, RetryPolicy) {
        let retry = &self.settings.retry;
        (retry.sequenced, retry.element, retry.cleanup)
    }

    fn schedule(&mut self) {
        let _ = self.throttle.schedule(self.clock.now());
    }

    // ── Snapshots and flushing ─────────────────────────────────────────────

    /// Feed a caller snapshot through the filter and arm the timer if needed.
    pub(crate) fn offer(&mut self, text: &str) {
        match self.session.offer(text) {
            OfferOutcome::Accepted => {
                debug!(chars = text.chars().count(), "snapshot accepted");
                self.schedule();
            }
            OfferOutcome::Diverged(DivergenceVerdict::Armed { streak }) => {
                debug!(streak, "snapshot diverged, rotation armed");
                self.schedule();
            }
            OfferOutcome::Diverged(DivergenceVerdict::Waiting { streak }) => {
                debug!(streak, "snapshot diverged");
            }
            OfferOutcome::Noise => debug!("noise snapshot suppressed"),
            OfferOutcome::Duplicate | OfferOutcome::Ignored => {}
        }
    }

    /// Timer fired: flush, then re-arm if work accumulated meanwhile.
    pub(crate) async fn on_timer(&mut self) {
        if !self.throttle.fire(self.clock.now()) {
            return;
        }
        self.flush().await;
        if self.session.has_work() {
            self.schedule();
        }
    }

    /// Rotation first (if armed), then pending text.
    async fn flush(&mut self) {
        if self.session.is_halted() {
            return;
        }
        self.session.record_flush();
        if let Some(target) = self.session.take_rotation() {
            self.rotate(&target).await;
        }
        if let Some(delivery) = self.session.next_delivery() {
            let _ = self.deliver(delivery).await;
        }
    }

    /// Cancel the timer and flush until nothing is left to send.
    pub(crate) async fn wait_idle(&mut self) {
        let _ = self.throttle.cancel();
        while self.session.has_work() {
            self.flush().await;
        }
    }

    // ── Transport steps ────────────────────────────────────────────────────

    /// Perform one delivery. Returns whether the remote now shows the text.
    async fn deliver(&mut self, delivery: Delivery) -> bool {
        let (sequenced, element, _) = self.policies();
        match delivery {
            Delivery::Create { content } => self.create_segment(&content, true).await,
            Delivery::Update { entity, content } => {
                let mutation = Mutation::UpdateContent {
                    entity,
                    content: content.clone(),
                };
                let result = self.queue.run(mutation, sequenced).await;
                self.settle_content(result, &content)
            }
            Delivery::SendPlain { text } => self.send_plain(&text, true).await,
            Delivery::EditPlain { message, text } => {
                let mutation = Mutation::EditPlain {
                    message,
                    text: text.clone(),
                };
                let result = self.queue.run(mutation, element).await;
                self.settle_content(result, &text)
            }
        }
    }

    fn settle_content(
        &mut self,
        result: Result<MutationOutcome, MutationError>,
        text: &str,
    ) -> bool {
        match result {
            Ok(MutationOutcome::Applied { sequence }) => {
                debug!(sequence, chars = text.chars().count(), "content delivered");
                self.session.on_content_sent(text);
                true
            }
            Ok(outcome) => {
                debug!(?outcome, "content delivery skipped");
                false
            }
            Err(err) => {
                self.halt(&err);
                false
            }
        }
    }

    /// Create an entity with `content` and bind it to a message.
    async fn create_segment(&mut self, content: &str, real: bool) -> bool {
        let (_, element, _) = self.policies();
        let created = self
            .queue
            .run(
                Mutation::CreateEntity {
                    content: content.to_owned(),
                },
                element,
            )
            .await;
        let entity = match created {
            Ok(MutationOutcome::Created { entity }) => entity,
            Ok(outcome) => {
                debug!(?outcome, "entity creation skipped");
                return false;
            }
            Err(err) => {
                self.halt(&err);
                return false;
            }
        };
        self.session.on_entity_created(entity.clone(), content, real);

        let bound = self
            .queue
            .run(
                Mutation::BindEntity {
                    entity: entity.clone(),
                    target: self.target.clone(),
                },
                element,
            )
            .await;
        match bound {
            Ok(MutationOutcome::Bound { message }) => {
                info!(entity_id = %entity, message_id = %message, placeholder = !real, "segment created");
                self.session.on_bound(message);
                true
            }
            Ok(outcome) => {
                debug!(?outcome, "entity binding skipped");
                false
            }
            Err(err) => {
                self.halt(&err);
                false
            }
        }
    }

    async fn send_plain(&mut self, text: &str, real: bool) -> bool {
        let (_, element, _) = self.policies();
        let sent = self
            .queue
            .run(
                Mutation::SendPlain {
                    text: text.to_owned(),
                    target: self.target.clone(),
                },
                element,
            )
            .await;
        match sent {
            Ok(MutationOutcome::Sent { message }) => {
                info!(message_id = %message, placeholder = !real, "plain segment created");
                self.session.on_plain_sent(message, text, real);
                true
            }
            Ok(outcome) => {
                debug!(?outcome, "plain send skipped");
                false
            }
            Err(err) => {
                self.halt(&err);
                false
            }
        }
    }

    /// Best-effort close of the live structured entity.
    async fn close_entity(&mut self) {
        let Some(entity) = self.session.entity_id().cloned() else {
            return;
        };
        let (sequenced, _, _) = self.policies();
        self.session.mark_closing();
        match self
            .queue
            .run(
                Mutation::CloseEntity {
                    entity: entity.clone(),
                },
                sequenced,
            )
            .await
        {
            Ok(_) => debug!(entity_id = %entity, "entity closed"),
            Err(err) => warn!(entity_id = %entity, error = %err, "failed to close entity"),
        }
        self.session.mark_closed();
    }

    fn halt(&mut self, err: &MutationError) {
        warn!(error = %err, category = ?err.category(), "streaming backend halted");
        self.session.halt();
        self.queue.retire();
    }

    // ── Rotation ───────────────────────────────────────────────────────────

    async fn rotate(&mut self, target: &str) {
        info!(
            outgoing = self.session.segment_text().chars().count(),
            incoming = target.chars().count(),
            "rotating segment"
        );
        if let Some(delivery) = self.session.catch_up_delivery() {
            let _ = self.deliver(delivery).await;
            if self.session.is_halted() {
                return;
            }
        }
        if self.session.needs_close() {
            self.close_entity().await;
        }

        let retired = self.session.retire_segment();
        self.queue.retire();
        if retired.ever_updated {
            if let Some(message_id) = retired.message {
                self.emit(SegmentFinalized {
                    message_id,
                    content: retired.content,
                    cause: SegmentCause::SegmentRotation,
                });
            }
        }
        self.session.accept_rotation_target(target);
    }

    fn emit(&self, event: SegmentFinalized) {
        info!(message_id = %event.message_id, cause = ?event.cause, "segment finalized");
        if let Some(callback) = &self.on_segment_finalized {
            callback(event);
        }
    }

    // ── Caller operations ──────────────────────────────────────────────────

    /// Create the entity (or plain message) early with placeholder content.
    pub(crate) async fn ensure_placeholder(&mut self) {
        if !self.settings.enabled
            || !self.settings.eager_placeholder
            || self.session.is_halted()
            || self.session.is_live()
            || self.session.pending().is_some()
            || self.session.finalized().is_some()
        {
            return;
        }
        let text = self.settings.placeholder_text.clone();
        let _ = match self.session.surface() {
            RenderSurface::Structured => self.create_segment(&text, false).await,
            RenderSurface::Plain => self.send_plain(&text, false).await,
        };
    }

    /// Deliver the final text. Repeat calls return the first result.
    pub(crate) async fn finalize(&mut self, text: &str) -> FinalizeOutcome {
        if let Some(done) = self.session.finalized() {
            return done.clone();
        }
        self.wait_idle().await;
        self.session.begin_finalize();
        let outcome = self.deliver_final(text).await;
        info!(handled = outcome.handled, "stream finalized");
        self.session.complete_finalize(outcome.clone());
        outcome
    }

    async fn deliver_final(&mut self, text: &str) -> FinalizeOutcome {
        if !self.settings.enabled || self.session.is_halted() || !self.session.is_live() {
            return FinalizeOutcome::not_handled();
        }
        let Some(message) = self.session.message_id().cloned() else {
            return FinalizeOutcome::not_handled();
        };

        let final_text = self.session.final_text(text);
        if !self.session.ever_updated() && final_text.trim().is_empty() {
            debug!("final text empty, placeholder left for cleanup");
            return FinalizeOutcome::not_handled();
        }
        if self.session.is_closed() {
            debug!("entity already closed, final update skipped");
        } else if final_text != self.session.last_sent() {
            let delivery = self.session.delivery_for(final_text.clone());
            if !self.deliver(delivery).await {
                return FinalizeOutcome::not_handled();
            }
        }

        let surface = self.session.surface();
        if self.session.needs_close() {
            if let Some(entity) = self.session.entity_id().cloned() {
                let (_, element, _) = self.policies();
                let summary = summarize(&final_text, self.settings.summary_max_chars);
                let result = self
                    .queue
                    .run(
                        Mutation::UpdateSummary {
                            entity,
                            summary,
                            content: final_text,
                        },
                        element,
                    )
                    .await;
                if let Err(err) = result {
                    warn!(error = %err, "failed to update entity summary");
                }
            }
            self.close_entity().await;
        }
        FinalizeOutcome::handled(message, surface)
    }

    /// Close a live structured entity nobody finalized.
    pub(crate) async fn close_if_needed(&mut self) {
        self.wait_idle().await;
        if self.session.needs_close() && self.session.finalized().is_none() {
            self.close_entity().await;
        }
    }

    /// Clear or delete a segment that never carried real content.
    pub(crate) async fn cleanup_abandoned_placeholder(&mut self) {
        self.wait_idle().await;
        if self.session.ever_updated() {
            return;
        }
        let message = self.session.message_id().cloned();
        if !self.session.is_live() && message.is_none() {
            return;
        }

        let (_, element, cleanup) = self.policies();
        let abandoned = self.settings.abandoned_text.clone();
        let clear = match (self.session.surface(), self.session.entity_id(), &message) {
            _ if self.session.is_halted() => None,
            (RenderSurface::Structured, Some(entity), _) => Some(Mutation::UpdateContent {
                entity: entity.clone(),
                content: abandoned,
            }),
            (RenderSurface::Plain, _, Some(message)) => Some(Mutation::EditPlain {
                message: message.clone(),
                text: abandoned,
            }),
            _ => None,
        };

        let cleared = match clear {
            Some(mutation) => match self.queue.run(mutation, element).await {
                Ok(MutationOutcome::Applied { .. }) => true,
                Ok(_) => false,
                Err(err) => {
                    warn!(error = %err, "failed to clear abandoned placeholder");
                    false
                }
            },
            None => false,
        };

        if cleared {
            info!("abandoned placeholder cleared");
        } else if let Some(message) = message {
            let result = self
                .queue
                .run(
                    Mutation::DeleteMessage {
                        message: message.clone(),
                    },
                    cleanup,
                )
                .await;
            match result {
                Ok(_) => info!(message_id = %message, "abandoned message deleted"),
                Err(err) => warn!(message_id = %message, error = %err, "failed to delete abandoned message"),
            }
        }
        self.queue.retire();
        self.session.mark_abandoned();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_collapses_whitespace_and_truncates() {
        assert_eq!(summarize("  Hello \n\n world  ", 50), "Hello world");
        assert_eq!(summarize(&"a".repeat(80), 50).chars().count(), 50);
        assert_eq!(summarize("héllo wörld", 4), "héll");
        assert_eq!(summarize("", 10), "");
    }
}
