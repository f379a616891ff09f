//! Value types exchanged with the controller's caller.

use std::sync::Arc;

use relay_core::MessageId;
use relay_settings::RenderSurface;
use serde::{Deserialize, Serialize};

use crate::session::BackendState;

/// Result of a final-delivery request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeOutcome {
    /// `false` means the caller must deliver the final text itself.
    pub handled: bool,
    /// Message carrying the final rendering, when handled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    /// Surface the final rendering lives on, when handled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_kind: Option<RenderSurface>,
}

impl FinalizeOutcome {
    /// The caller must fall back to ordinary delivery.
    #[must_use]
    pub fn not_handled() -> Self {
        Self {
            handled: false,
            message_id: None,
            render_kind: None,
        }
    }

    /// Final text was delivered into `message_id`.
    #[must_use]
    pub fn handled(message_id: MessageId, render_kind: RenderSurface) -> Self {
        Self {
            handled: true,
            message_id: Some(message_id),
            render_kind: Some(render_kind),
        }
    }
}

/// Why a segment was retired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentCause {
    /// Incoming text diverged and a fresh entity replaced the segment.
    SegmentRotation,
}

/// Notification that a segment's entity was retired with final content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentFinalized {
    /// Message wrapping the retired entity.
    pub message_id: MessageId,
    /// Text the segment carried when it was retired.
    pub content: String,
    /// Why the segment was retired.
    pub cause: SegmentCause,
}

/// Callback invoked once per retired segment, in rotation order.
pub type SegmentCallback = Arc<dyn Fn(SegmentFinalized) + Send + Sync>;

/// Observability snapshot of a session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStats {
    /// Backend state machine position.
    pub backend: BackendState,
    /// Snapshots accepted by the non-regression filter.
    pub partials_accepted: u64,
    /// Throttle flushes performed.
    pub flushes_performed: u64,
    /// Transport calls that delivered new text.
    pub successful_updates: u64,
    /// Segments retired by rotation.
    pub rotations: u64,
    /// Current run of rejected snapshots.
    pub divergence_streak: u32,
    /// Whether the current segment received real content.
    pub ever_updated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_handled_serializes_compactly() {
        let json = serde_json::to_value(FinalizeOutcome::not_handled()).unwrap();
        assert_eq!(json, serde_json::json!({ "handled": false }));
    }

    #[test]
    fn segment_cause_wire_name() {
        let event = SegmentFinalized {
            message_id: MessageId::from("om_1"),
            content: "done".into(),
            cause: SegmentCause::SegmentRotation,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["cause"], "segment_rotation");
        assert_eq!(json["messageId"], "om_1");
    }
}
