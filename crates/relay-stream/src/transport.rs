//! Transport primitives the controller drives.
//!
//! Implementations talk to the concrete messaging surface. Each method is a
//! single remote call; retry, sequencing, and ordering are the caller's
//! concern, so implementations should not retry internally.

use async_trait::async_trait;
use relay_core::{ConversationId, EntityId, MessageId, TransportError};
use serde::{Deserialize, Serialize};

/// Where a session's output is delivered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryTarget {
    /// Conversation receiving the message.
    pub conversation_id: ConversationId,
    /// Message being replied to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    /// User identifiers to mention on plain messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,
}

impl DeliveryTarget {
    /// Target a conversation without reply or mentions.
    #[must_use]
    pub fn new(conversation_id: impl Into<ConversationId>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            reply_to: None,
            mentions: Vec::new(),
        }
    }

    /// Reply to a specific message.
    #[must_use]
    pub fn replying_to(mut self, message: impl Into<MessageId>) -> Self {
        self.reply_to = Some(message.into());
        self
    }
}

/// Remote surface operations.
///
/// Implementors must be `Send + Sync`; a single instance may serve many
/// concurrent sessions.
#[async_trait]
pub trait EntityTransport: Send + Sync {
    /// Create a rich entity with initial content.
    async fn create_entity(&self, content: &str) -> Result<EntityId, TransportError>;

    /// Post a message wrapping `entity` into the target conversation.
    async fn bind_entity_to_message(
        &self,
        entity: &EntityId,
        target: &DeliveryTarget,
    ) -> Result<MessageId, TransportError>;

    /// Replace the entity's streamed content.
    async fn update_entity_content(
        &self,
        entity: &EntityId,
        content: &str,
        sequence: u64,
    ) -> Result<(), TransportError>;

    /// Set the entity's summary (preview) alongside its content.
    async fn update_entity_summary(
        &self,
        entity: &EntityId,
        summary: &str,
        content: &str,
        sequence: u64,
    ) -> Result<(), TransportError>;

    /// Mark the entity's streaming as finished.
    async fn close_entity(&self, entity: &EntityId, sequence: u64) -> Result<(), TransportError>;

    /// Delete a message.
    async fn delete_message(&self, message: &MessageId) -> Result<(), TransportError>;

    /// Send an ordinary text message.
    async fn send_plain_message(
        &self,
        text: &str,
        target: &DeliveryTarget,
    ) -> Result<MessageId, TransportError>;

    /// Replace the text of an ordinary message.
    async fn edit_plain_message(&self, message: &MessageId, text: &str)
    -> Result<(), TransportError>;
}
