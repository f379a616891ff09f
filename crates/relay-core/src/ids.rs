//! Branded ID newtypes for type safety.
//!
//! Identifiers handed out by the remote messaging surface are opaque strings.
//! Wrapping each kind in its own newtype prevents passing a message ID where
//! an entity ID is expected, which matters because structured surfaces give
//! the card entity and its wrapping message distinct identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Fresh time-ordered ID (UUID v7).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

branded_id! {
    /// Identifier of a remote rich-content entity (e.g. a structured card).
    EntityId
}

branded_id! {
    /// Identifier of a message on the remote surface.
    ///
    /// On structured surfaces this is the message wrapping an entity; on plain
    /// surfaces it is the streamed message itself.
    MessageId
}

branded_id! {
    /// Identifier of the conversation (chat, channel, thread) being delivered to.
    ConversationId
}

branded_id! {
    /// Locally generated identifier of one streaming session, used to
    /// correlate its log lines.
    SessionId
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_uuid_v7() {
        let id = SessionId::new();
        let parsed = Uuid::parse_str(id.as_str()).expect("should be valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn session_ids_are_distinct() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn serde_is_transparent() {
        let id = EntityId::from("card_123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"card_123\"");
        let back: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn deref_and_display() {
        let id = ConversationId::from_string("oc_42".to_string());
        assert!(id.starts_with("oc_"));
        assert_eq!(format!("{id}"), "oc_42");
    }
}
