//! Typed gateway events
//!
//! A closed set of known event kinds. The wire carries a type string and
//! an opaque payload; the decoder registry turns the pair into one of
//! these variants. Kinds without a registered decoder surface as
//! [`EventPayload::Unknown`] so nothing is silently lost.

use pulse_rest::RateLimitEvent;
use serde::{Deserialize, Serialize};

/// Wire type strings for the events this crate knows about
pub mod event_type {
    pub const READY: &str = "READY";
    pub const RESUMED: &str = "RESUMED";
    pub const MESSAGE_CREATE: &str = "MESSAGE_CREATE";
    pub const MESSAGE_UPDATE: &str = "MESSAGE_UPDATE";
    pub const MESSAGE_DELETE: &str = "MESSAGE_DELETE";
    pub const PRESENCE_UPDATE: &str = "PRESENCE_UPDATE";
    pub const TYPING_START: &str = "TYPING_START";

    // Synthetic lifecycle events, never seen on the wire
    pub const CONNECTED: &str = "__CONNECTED__";
    pub const DISCONNECTED: &str = "__DISCONNECTED__";
    pub const RATE_LIMITED: &str = "__RATE_LIMITED__";
}

/// A user as carried inside event payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
}

/// Payload of the READY dispatch, completing a fresh Identify
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ready {
    /// Session ID to use for resuming
    pub session_id: String,
    /// The authenticated user
    #[serde(default)]
    pub user: Option<User>,
}

/// A message as carried by MESSAGE_CREATE / MESSAGE_UPDATE
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub author: Option<User>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Payload of MESSAGE_DELETE
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDelete {
    pub id: String,
    pub channel_id: String,
}

/// Payload of PRESENCE_UPDATE
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceUpdateEvent {
    pub user_id: String,
    pub status: String,
}

/// Payload of TYPING_START
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingStart {
    pub user_id: String,
    pub channel_id: String,
}

/// A decoded event payload
#[derive(Debug, Clone)]
pub enum EventPayload {
    Ready(Ready),
    Resumed,
    MessageCreate(Box<Message>),
    MessageUpdate(Box<Message>),
    MessageDelete(MessageDelete),
    PresenceUpdate(PresenceUpdateEvent),
    TypingStart(TypingStart),

    /// Synthetic: the gateway connection completed its handshake
    Connected,
    /// Synthetic: the gateway connection was closed
    Disconnected,
    /// Synthetic: a REST request was rate limited
    RateLimited(RateLimitEvent),

    /// A dispatch with no registered decoder, kept as raw JSON
    Unknown {
        event_type: String,
        data: serde_json::Value,
    },
}

impl EventPayload {
    /// The wire (or synthetic) type string of this payload
    #[must_use]
    pub fn event_type(&self) -> &str {
        match self {
            Self::Ready(_) => event_type::READY,
            Self::Resumed => event_type::RESUMED,
            Self::MessageCreate(_) => event_type::MESSAGE_CREATE,
            Self::MessageUpdate(_) => event_type::MESSAGE_UPDATE,
            Self::MessageDelete(_) => event_type::MESSAGE_DELETE,
            Self::PresenceUpdate(_) => event_type::PRESENCE_UPDATE,
            Self::TypingStart(_) => event_type::TYPING_START,
            Self::Connected => event_type::CONNECTED,
            Self::Disconnected => event_type::DISCONNECTED,
            Self::RateLimited(_) => event_type::RATE_LIMITED,
            Self::Unknown { event_type, .. } => event_type,
        }
    }
}

/// An event as delivered to subscribers
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    /// Sequence number from the dispatch frame, absent for synthetic events
    pub sequence: Option<u64>,
    /// The wire (or synthetic) type string
    pub event_type: String,
    /// The decoded payload
    pub payload: EventPayload,
}

impl GatewayEvent {
    /// Create a synthetic lifecycle event
    #[must_use]
    pub fn synthetic(payload: EventPayload) -> Self {
        Self {
            sequence: None,
            event_type: payload.event_type().to_string(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_mapping() {
        let ready = EventPayload::Ready(Ready {
            session_id: "sess".to_string(),
            user: None,
        });
        assert_eq!(ready.event_type(), "READY");

        let unknown = EventPayload::Unknown {
            event_type: "GUILD_BANNER_UPDATE".to_string(),
            data: serde_json::json!({}),
        };
        assert_eq!(unknown.event_type(), "GUILD_BANNER_UPDATE");
    }

    #[test]
    fn test_synthetic_event_has_no_sequence() {
        let event = GatewayEvent::synthetic(EventPayload::Connected);
        assert_eq!(event.sequence, None);
        assert_eq!(event.event_type, "__CONNECTED__");
    }
}
