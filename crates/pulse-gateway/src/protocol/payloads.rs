//! Handshake payload definitions
//!
//! Payloads for the connection lifecycle frames. Dispatched event
//! payloads live in [`crate::events`].

use pulse_common::{ClientConfig, Intents};
use serde::{Deserialize, Serialize};

/// Payload of op 10 (Hello), sent by the server immediately after connect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hello {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

/// Payload of op 2 (Identify), starting a brand-new session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identify {
    /// Authentication token, including its scheme prefix
    pub token: String,

    /// Declared capability bitmask
    pub intents: u64,

    /// Whether the server may send zlib-compressed frames
    pub compress: bool,

    /// Shard `[index, count]`, omitted for unsharded sessions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard: Option<[u32; 2]>,

    /// Client properties
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<IdentifyProperties>,
}

impl Identify {
    /// Build an Identify payload from the client configuration
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            token: config.token.clone(),
            intents: config.intents.bits(),
            compress: config.compress,
            shard: config.shard,
            properties: Some(IdentifyProperties::default()),
        }
    }

    /// The intents as a typed bitmask
    #[must_use]
    pub fn intents(&self) -> Intents {
        Intents::from_bits_truncate(self.intents)
    }
}

/// Client connection properties sent with Identify
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyProperties {
    /// Operating system
    pub os: String,
    /// Library name
    pub device: String,
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            device: "pulse".to_string(),
        }
    }
}

/// Payload of op 6 (Resume), continuing a previous session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resume {
    /// Authentication token
    pub token: String,
    /// Session ID to resume
    pub session_id: String,
    /// Last received sequence number
    pub seq: u64,
}

/// Payload of op 3 (Presence Update)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceUpdate {
    /// New status (online, idle, dnd, offline)
    pub status: String,
}

impl PresenceUpdate {
    /// Valid status values
    pub const VALID_STATUSES: &'static [&'static str] = &["online", "idle", "dnd", "offline"];

    /// Check if the status is valid
    #[must_use]
    pub fn is_valid_status(&self) -> bool {
        Self::VALID_STATUSES.contains(&self.status.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify_from_config() {
        let config = ClientConfig::new("Bot abc").with_shard(1, 4);
        let identify = Identify::from_config(&config);

        assert_eq!(identify.token, "Bot abc");
        assert_eq!(identify.shard, Some([1, 4]));
        assert!(identify.compress);
        assert_eq!(identify.intents(), Intents::standard());
    }

    #[test]
    fn test_identify_serialization_omits_empty_shard() {
        let identify = Identify::from_config(&ClientConfig::new("Bot abc"));
        let json = serde_json::to_string(&identify).unwrap();
        assert!(!json.contains("shard"));
        assert!(json.contains("intents"));
    }

    #[test]
    fn test_resume_serialization() {
        let resume = Resume {
            token: "Bot abc".to_string(),
            session_id: "sess-1".to_string(),
            seq: 99,
        };
        let json = serde_json::to_string(&resume).unwrap();
        assert!(json.contains("sess-1"));
        assert!(json.contains("99"));
    }

    #[test]
    fn test_presence_status_validation() {
        let valid = PresenceUpdate { status: "idle".to_string() };
        assert!(valid.is_valid_status());

        let invalid = PresenceUpdate { status: "busy".to_string() };
        assert!(!invalid.is_valid_status());
    }
}
