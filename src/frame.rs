//! Wire frames for the whiteboard and chat relays.
//!
//! ARCHITECTURE
//! ============
//! Every frame is a JSON text message with a `type` discriminator. Server
//! events are typed enums serialized once per broadcast and shared across
//! recipients as `Outbound`.
//!
//! Whiteboard client frames carry no fixed shape: any JSON object is relayed
//! to peers with `user_id` and `name` replaced by the sender's authenticated
//! identity. `RelayFrame` holds the payload with those reserved keys already
//! stripped so they can only come from the server.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::room::{Outbound, Participant};
use crate::services::chat::ChatMessage;

/// Keys the server owns in relayed whiteboard payloads.
pub const RESERVED_KEYS: [&str; 2] = ["user_id", "name"];

// =============================================================================
// WHITEBOARD
// =============================================================================

/// Server -> client whiteboard events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WhiteboardEvent {
    Join { user_id: Uuid, name: String, users: Vec<Participant> },
    Leave { user_id: Uuid, name: String, users: Vec<Participant> },
    Users { users: Vec<Participant> },
}

/// A client whiteboard payload stamped with the sender's identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayFrame {
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
    pub user_id: Uuid,
    pub name: String,
}

impl RelayFrame {
    /// Parse an inbound frame. Returns `None` unless it is a JSON object.
    #[must_use]
    pub fn parse(text: &str, user_id: Uuid, name: &str) -> Option<Self> {
        let mut payload: serde_json::Map<String, serde_json::Value> = serde_json::from_str(text).ok()?;
        for key in RESERVED_KEYS {
            payload.remove(key);
        }
        Some(Self { payload, user_id, name: name.to_owned() })
    }
}

// =============================================================================
// CHAT
// =============================================================================

/// Client -> server chat commands. Unknown types fail to parse and are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatCommand {
    Message {
        #[serde(default)]
        content: String,
    },
    Typing,
}

/// Server -> client chat events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatEvent {
    Presence { users: Vec<Participant> },
    Message { message: ChatMessage },
    Typing { user_id: Uuid, name: String },
}

// =============================================================================
// SHARED
// =============================================================================

/// Sent once before closing a connection that failed authentication or
/// authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "error")]
pub struct ErrorFrame {
    pub message: String,
}

impl ErrorFrame {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Serialize a frame for queueing. Serialization of these types cannot fail
/// in practice; a failure is logged and yields `None`.
pub fn encode<T: Serialize>(frame: &T) -> Option<Outbound> {
    match serde_json::to_string(frame) {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            tracing::warn!(error = %e, "frame: failed to serialize");
            None
        }
    }
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
