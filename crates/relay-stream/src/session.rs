//! Per-session state record.
//!
//! [`StreamSession`] holds everything the controller knows about one delivery
//! target: backend state, current entity and message ids, the text pipeline
//! (`last_offered` → `last_accepted` → `pending` → `last_sent`), the divergence
//! tracker, counters, and lifecycle flags. It performs no I/O. The lifecycle
//! layer asks it what to send next and reports transport results back through
//! the named `on_*` transitions, so every state change is unit-testable
//! without timers or a transport.

use relay_core::{EntityId, MessageId};
use relay_settings::{FilterSettings, RenderSurface};
use serde::{Deserialize, Serialize};

use crate::divergence::{DivergenceTracker, DivergenceVerdict};
use crate::filter::{SnapshotFilter, normalize};
use crate::types::{FinalizeOutcome, StreamStats};

/// Backend state machine position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendState {
    /// No live segment.
    #[default]
    Inactive,
    /// A structured entity is live.
    Active,
    /// A plain message is live.
    PlainActive,
    /// Streaming gave up for the rest of the session.
    Halted,
}

/// What happened to an offered snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OfferOutcome {
    /// Session is halted, closed, or finalizing.
    Ignored,
    /// Identical to the previous offer.
    Duplicate,
    /// Short punctuation-only snapshot.
    Noise,
    /// Accepted and pending delivery.
    Accepted,
    /// Rejected by the non-regression filter while a segment is live.
    Diverged(DivergenceVerdict),
}

/// Next transport action needed to deliver text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Create the segment's entity with initial content.
    Create {
        /// Initial content.
        content: String,
    },
    /// Update the live entity.
    Update {
        /// Live entity.
        entity: EntityId,
        /// New content.
        content: String,
    },
    /// Send the segment's plain message.
    SendPlain {
        /// Message text.
        text: String,
    },
    /// Edit the live plain message.
    EditPlain {
        /// Live message.
        message: MessageId,
        /// New text.
        text: String,
    },
}

/// Per-entity fields captured when a segment is retired.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetiredSegment {
    /// Entity that was live.
    pub entity: Option<EntityId>,
    /// Message wrapping it.
    pub message: Option<MessageId>,
    /// Text attributed to the segment.
    pub content: String,
    /// Whether the segment ever carried real content.
    pub ever_updated: bool,
}

/// Explicit state of one streaming session.
#[derive(Clone, Debug)]
pub struct StreamSession {
    surface: RenderSurface,
    backend: BackendState,
    entity_id: Option<EntityId>,
    message_id: Option<MessageId>,
    last_offered: Option<String>,
    last_accepted: String,
    last_sent: String,
    pending: Option<String>,
    segment_text: String,
    divergence: DivergenceTracker,
    filter: SnapshotFilter,
    partials_accepted: u64,
    flushes_performed: u64,
    successful_updates: u64,
    rotations: u64,
    ever_updated: bool,
    closing: bool,
    closed: bool,
    finalizing: bool,
    finalized: Option<FinalizeOutcome>,
}

impl StreamSession {
    /// Fresh session on `surface`.
    #[must_use]
    pub fn new(surface: RenderSurface, filter: &FilterSettings) -> Self {
        Self {
            surface,
            backend: BackendState::Inactive,
            entity_id: None,
            message_id: None,
            last_offered: None,
            last_accepted: String::new(),
            last_sent: String::new(),
            pending: None,
            segment_text: String::new(),
            divergence: DivergenceTracker::new(filter),
            filter: SnapshotFilter::new(filter),
            partials_accepted: 0,
            flushes_performed: 0,
            successful_updates: 0,
            rotations: 0,
            ever_updated: false,
            closing: false,
            closed: false,
            finalizing: false,
            finalized: None,
        }
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    /// Surface fixed for the session.
    pub fn surface(&self) -> RenderSurface {
        self.surface
    }

    /// Backend state.
    pub fn backend(&self) -> BackendState {
        self.backend
    }

    /// Whether streaming has given up.
    pub fn is_halted(&self) -> bool {
        self.backend == BackendState::Halted
    }

    /// Live entity.
    pub fn entity_id(&self) -> Option<&EntityId> {
        self.entity_id.as_ref()
    }

    /// Message wrapping the live segment.
    pub fn message_id(&self) -> Option<&MessageId> {
        self.message_id.as_ref()
    }

    /// Last text the remote confirmed.
    pub fn last_sent(&self) -> &str {
        &self.last_sent
    }

    /// Last text the filter accepted.
    pub fn last_accepted(&self) -> &str {
        &self.last_accepted
    }

    /// Text attributed to the live segment.
    pub fn segment_text(&self) -> &str {
        &self.segment_text
    }

    /// Accepted text awaiting delivery.
    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Whether the live segment carried real content.
    pub fn ever_updated(&self) -> bool {
        self.ever_updated
    }

    /// Whether the structured entity was closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether a remote object currently represents the segment.
    pub fn is_live(&self) -> bool {
        match self.surface {
            RenderSurface::Structured => self.entity_id.is_some(),
            RenderSurface::Plain => self.message_id.is_some(),
        }
    }

    /// Whether a flush would do anything.
    pub fn has_work(&self) -> bool {
        !self.is_halted() && (self.pending.is_some() || (self.is_live() && self.divergence.is_armed()))
    }

    /// Cached result of a completed finalize.
    pub fn finalized(&self) -> Option<&FinalizeOutcome> {
        self.finalized.as_ref()
    }

    // ── Incoming text ──────────────────────────────────────────────────────

    /// Offer a caller snapshot.
    pub fn offer(&mut self, text: &str) -> OfferOutcome {
        if self.is_halted() || self.closed || self.finalizing || self.finalized.is_some() {
            return OfferOutcome::Ignored;
        }
        if self.last_offered.as_deref() == Some(text) {
            return OfferOutcome::Duplicate;
        }
        self.last_offered = Some(text.to_owned());

        if self.filter.is_noise(text) {
            return OfferOutcome::Noise;
        }
        if !self.is_live() || self.filter.accepts(&self.last_accepted, text) {
            self.accept(text);
            return OfferOutcome::Accepted;
        }
        let normalized = normalize(text).chars().count();
        OfferOutcome::Diverged(self.divergence.record_rejection(text, normalized))
    }

    fn accept(&mut self, text: &str) {
        self.last_accepted = text.to_owned();
        self.segment_text = text.to_owned();
        self.pending = Some(text.to_owned());
        self.divergence.reset();
        self.partials_accepted += 1;
    }

    /// Take an armed rotation's target text.
    pub fn take_rotation(&mut self) -> Option<String> {
        if !self.is_live() || self.is_halted() {
            return None;
        }
        self.divergence.take_rotation()
    }

    /// Take pending text and decide how to deliver it.
    pub fn next_delivery(&mut self) -> Option<Delivery> {
        if self.is_halted() {
            self.pending = None;
            return None;
        }
        let text = self.pending.take()?;
        if self.is_live() && text == self.last_sent {
            return None;
        }
        Some(self.delivery_for(text))
    }

    /// Update bringing the live segment up to its accumulated text, if behind.
    pub fn catch_up_delivery(&self) -> Option<Delivery> {
        if self.is_halted() || !self.is_live() || self.segment_text.is_empty() {
            return None;
        }
        if self.segment_text == self.last_sent {
            return None;
        }
        Some(self.delivery_for(self.segment_text.clone()))
    }

    /// Transport action that would put `text` on the live segment.
    pub fn delivery_for(&self, text: String) -> Delivery {
        match (self.surface, &self.entity_id, &self.message_id) {
            (RenderSurface::Structured, Some(entity), _) => Delivery::Update {
                entity: entity.clone(),
                content: text,
            },
            (RenderSurface::Structured, None, _) => Delivery::Create { content: text },
            (RenderSurface::Plain, _, Some(message)) => Delivery::EditPlain {
                message: message.clone(),
                text,
            },
            (RenderSurface::Plain, _, None) => Delivery::SendPlain { text },
        }
    }

    // ── Transport results ──────────────────────────────────────────────────

    /// Entity created with `content`; `real` is false for a placeholder.
    pub fn on_entity_created(&mut self, entity: EntityId, content: &str, real: bool) {
        self.entity_id = Some(entity);
        self.backend = BackendState::Active;
        self.closing = false;
        self.closed = false;
        if real {
            self.mark_sent(content);
        }
    }

    /// Entity wrapped in `message`.
    pub fn on_bound(&mut self, message: MessageId) {
        self.message_id = Some(message);
    }

    /// Content update (or plain edit) confirmed.
    pub fn on_content_sent(&mut self, text: &str) {
        self.mark_sent(text);
    }

    /// Plain message sent; `real` is false for a placeholder.
    pub fn on_plain_sent(&mut self, message: MessageId, text: &str, real: bool) {
        self.message_id = Some(message);
        self.backend = BackendState::PlainActive;
        if real {
            self.mark_sent(text);
        }
    }

    fn mark_sent(&mut self, text: &str) {
        self.last_sent = text.to_owned();
        self.ever_updated = true;
        self.successful_updates += 1;
    }

    /// Give up on streaming. The wrapping message id is kept for cleanup.
    pub fn halt(&mut self) {
        self.backend = BackendState::Halted;
        self.entity_id = None;
        self.pending = None;
        self.divergence.reset();
    }

    /// Count a throttle flush.
    pub fn record_flush(&mut self) {
        self.flushes_performed += 1;
    }

    // ── Rotation ───────────────────────────────────────────────────────────

    /// Reset every per-entity field, returning what the segment held.
    pub fn retire_segment(&mut self) -> RetiredSegment {
        let retired = RetiredSegment {
            entity: self.entity_id.take(),
            message: self.message_id.take(),
            content: std::mem::take(&mut self.segment_text),
            ever_updated: self.ever_updated,
        };
        self.last_accepted.clear();
        self.last_sent.clear();
        self.pending = None;
        self.ever_updated = false;
        self.closing = false;
        self.closed = false;
        self.divergence.reset();
        if !self.is_halted() {
            self.backend = BackendState::Inactive;
        }
        self.rotations += 1;
        retired
    }

    /// Treat a rotation's target as the first snapshot of the new segment.
    pub fn accept_rotation_target(&mut self, text: &str) {
        self.accept(text);
    }

    // ── Finalize and close ─────────────────────────────────────────────────

    /// Text to deliver as the final rendering.
    ///
    /// The offered text wins unless the filter would reject it against the
    /// segment's accumulated text, so the final rendering never regresses.
    pub fn final_text(&self, offered: &str) -> String {
        if self.segment_text.is_empty() {
            return offered.to_owned();
        }
        if self.filter.is_noise(offered) || !self.filter.accepts(&self.segment_text, offered) {
            return self.segment_text.clone();
        }
        offered.to_owned()
    }

    /// Enter finalization; further offers are ignored.
    pub fn begin_finalize(&mut self) {
        self.finalizing = true;
    }

    /// Record the finalize result.
    pub fn complete_finalize(&mut self, outcome: FinalizeOutcome) {
        self.finalizing = false;
        self.finalized = Some(outcome);
    }

    /// Whether a close still needs to be sent for the live entity.
    pub fn needs_close(&self) -> bool {
        self.surface == RenderSurface::Structured
            && self.entity_id.is_some()
            && !self.is_halted()
            && !self.closing
            && !self.closed
    }

    /// A close is about to be sent.
    pub fn mark_closing(&mut self) {
        self.closing = true;
    }

    /// The close attempt finished (successfully or not).
    pub fn mark_closed(&mut self) {
        self.closing = false;
        self.closed = true;
    }

    /// Abandoned segment cleaned up; nothing remains to deliver into.
    pub fn mark_abandoned(&mut self) {
        self.entity_id = None;
        self.message_id = None;
        self.pending = None;
        self.closed = true;
        self.divergence.reset();
        if !self.is_halted() {
            self.backend = BackendState::Inactive;
        }
    }

    /// Observability snapshot.
    pub fn stats(&self) -> StreamStats {
        StreamStats {
            backend: self.backend,
            partials_accepted: self.partials_accepted,
            flushes_performed: self.flushes_performed,
            successful_updates: self.successful_updates,
            rotations: self.rotations,
            divergence_streak: self.divergence.streak(),
            ever_updated: self.ever_updated,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn structured() -> StreamSession {
        StreamSession::new(RenderSurface::Structured, &FilterSettings::default())
    }

    fn live(text: &str) -> StreamSession {
        let mut session = structured();
        assert_eq!(session.offer(text), OfferOutcome::Accepted);
        let delivery = session.next_delivery();
        assert_matches!(delivery, Some(Delivery::Create { .. }));
        session.on_entity_created(EntityId::from("entity-1"), text, true);
        session.on_bound(MessageId::from("message-1"));
        session
    }

    #[test]
    fn first_snapshot_creates_then_updates() {
        let mut session = live("Hello");
        assert_eq!(session.backend(), BackendState::Active);
        assert_eq!(session.offer("Hello wor"), OfferOutcome::Accepted);
        assert_eq!(
            session.next_delivery(),
            Some(Delivery::Update {
                entity: EntityId::from("entity-1"),
                content: "Hello wor".into(),
            })
        );
        session.on_content_sent("Hello wor");
        assert_eq!(session.last_sent(), "Hello wor");
        assert_eq!(session.stats().successful_updates, 2);
    }

    #[test]
    fn pending_keeps_only_latest() {
        let mut session = live("Hello");
        let _ = session.offer("Hello w");
        let _ = session.offer("Hello wo");
        let _ = session.offer("Hello world");
        assert_eq!(session.pending(), Some("Hello world"));
        assert_eq!(session.stats().partials_accepted, 4);
    }

    #[test]
    fn duplicate_and_noise_are_not_delivered() {
        let mut session = live("Hello");
        assert_eq!(session.offer("Hello"), OfferOutcome::Duplicate);
        assert_eq!(session.offer("**"), OfferOutcome::Noise);
        assert_eq!(session.offer("```"), OfferOutcome::Noise);
        assert_eq!(session.next_delivery(), None);
        assert_eq!(session.stats().divergence_streak, 0);
    }

    #[test]
    fn unchanged_pending_is_dropped() {
        let mut session = live("Hello");
        let _ = session.offer("Hello!");
        let _ = session.offer("Hello");
        assert_eq!(session.next_delivery(), None);
        assert!(!session.has_work());
    }

    #[test]
    fn divergence_arms_rotation_and_retires_segment() {
        let x = "X".repeat(50);
        let mut session = live(&x);
        assert_matches!(
            session.offer(&"Y".repeat(45)),
            OfferOutcome::Diverged(DivergenceVerdict::Waiting { streak: 1 })
        );
        assert_matches!(
            session.offer(&"Z".repeat(46)),
            OfferOutcome::Diverged(DivergenceVerdict::Armed { streak: 2 })
        );
        assert!(session.has_work());

        let target = session.take_rotation().unwrap();
        assert_eq!(target, "Z".repeat(46));
        assert_eq!(session.catch_up_delivery(), None);

        let retired = session.retire_segment();
        assert_eq!(retired.content, x);
        assert_eq!(retired.message, Some(MessageId::from("message-1")));
        assert!(retired.ever_updated);
        assert_eq!(session.backend(), BackendState::Inactive);

        session.accept_rotation_target(&target);
        assert_eq!(session.next_delivery(), Some(Delivery::Create { content: target }));
        assert_eq!(session.stats().rotations, 1);
    }

    #[test]
    fn accepted_snapshot_between_divergences_resets_streak() {
        let x = "X".repeat(50);
        let mut session = live(&x);
        let _ = session.offer(&"Y".repeat(45));
        assert_eq!(session.offer(&format!("{x}X")), OfferOutcome::Accepted);
        assert_matches!(
            session.offer(&"Z".repeat(46)),
            OfferOutcome::Diverged(DivergenceVerdict::Waiting { streak: 1 })
        );
        assert!(session.take_rotation().is_none());
    }

    #[test]
    fn without_live_segment_everything_is_accepted() {
        let mut session = structured();
        assert_eq!(session.offer(&"X".repeat(50)), OfferOutcome::Accepted);
        assert_eq!(session.offer("short"), OfferOutcome::Accepted);
        assert_eq!(session.pending(), Some("short"));
    }

    #[test]
    fn final_text_never_regresses() {
        let session = live("The answer is forty-two.");
        assert_eq!(session.final_text("The"), "The answer is forty-two.");
        assert_eq!(
            session.final_text("The answer is forty-two. Done."),
            "The answer is forty-two. Done."
        );
        assert_eq!(session.final_text("**"), "The answer is forty-two.");
    }

    #[test]
    fn halt_ignores_further_offers_and_keeps_message() {
        let mut session = live("Hello");
        let _ = session.offer("Hello world");
        session.halt();
        assert!(session.is_halted());
        assert_eq!(session.entity_id(), None);
        assert_eq!(session.message_id(), Some(&MessageId::from("message-1")));
        assert_eq!(session.offer("Hello world!"), OfferOutcome::Ignored);
        assert_eq!(session.next_delivery(), None);
    }

    #[test]
    fn placeholder_creation_is_not_an_update() {
        let mut session = structured();
        session.on_entity_created(EntityId::from("entity-1"), "…", false);
        assert!(!session.ever_updated());
        assert_eq!(session.offer("Hi there"), OfferOutcome::Accepted);
        assert_matches!(session.next_delivery(), Some(Delivery::Update { .. }));
    }

    #[test]
    fn plain_surface_sends_then_edits() {
        let mut session = StreamSession::new(RenderSurface::Plain, &FilterSettings::default());
        let _ = session.offer("Hello");
        assert_eq!(
            session.next_delivery(),
            Some(Delivery::SendPlain { text: "Hello".into() })
        );
        session.on_plain_sent(MessageId::from("message-1"), "Hello", true);
        assert_eq!(session.backend(), BackendState::PlainActive);
        let _ = session.offer("Hello there");
        assert_matches!(session.next_delivery(), Some(Delivery::EditPlain { .. }));
        assert!(!session.needs_close());
    }

    #[test]
    fn close_bookkeeping() {
        let mut session = live("Hello");
        assert!(session.needs_close());
        session.mark_closing();
        assert!(!session.needs_close());
        session.mark_closed();
        assert!(session.is_closed());
        assert_eq!(session.offer("Hello again"), OfferOutcome::Ignored);
    }

    #[test]
    fn stats_serialize_backend_kebab_case() {
        let mut session = StreamSession::new(RenderSurface::Plain, &FilterSettings::default());
        session.on_plain_sent(MessageId::from("m"), "hi", true);
        let json = serde_json::to_value(session.stats()).unwrap();
        assert_eq!(json["backend"], "plain-active");
        assert_eq!(json["everUpdated"], true);
    }
}

#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;

    #[derive(Clone, Debug)]
    enum Step {
        Grow(String),
        Truncate(usize),
        Restart(String),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            6 => "[a-z ]{1,8}".prop_map(Step::Grow),
            2 => (1usize..12).prop_map(Step::Truncate),
            1 => "[A-Z]{1,60}".prop_map(Step::Restart),
        ]
    }

    fn apply(current: &str, step: &Step) -> String {
        match step {
            Step::Grow(suffix) => format!("{current}{suffix}"),
            Step::Truncate(n) => {
                let keep = current.chars().count().saturating_sub(*n);
                current.chars().take(keep).collect()
            }
            Step::Restart(text) => text.clone(),
        }
    }

    proptest! {
        #[test]
        fn transmitted_text_never_regresses(steps in prop::collection::vec(step(), 1..60)) {
            let filter = SnapshotFilter::default();
            let mut session = StreamSession::new(RenderSurface::Structured, &FilterSettings::default());
            let mut snapshot = String::new();
            let mut entities = 0u32;
            let mut previous_sent: Option<String> = None;

            for step in &steps {
                snapshot = apply(&snapshot, step);
                let _ = session.offer(&snapshot);

                if let Some(target) = session.take_rotation() {
                    let _ = session.retire_segment();
                    session.accept_rotation_target(&target);
                    previous_sent = None;
                }
                match session.next_delivery() {
                    Some(Delivery::Create { content }) => {
                        entities += 1;
                        session.on_entity_created(EntityId::from(format!("e{entities}")), &content, true);
                        previous_sent = Some(content);
                    }
                    Some(Delivery::Update { content, .. }) => {
                        if let Some(prev) = &previous_sent {
                            prop_assert!(filter.accepts(prev, &content), "{prev:?} -> {content:?}");
                        }
                        session.on_content_sent(&content);
                        previous_sent = Some(content);
                    }
                    Some(other) => prop_assert!(false, "unexpected delivery {other:?}"),
                    None => {}
                }
            }
        }
    }
}
