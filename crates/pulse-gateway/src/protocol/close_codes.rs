//! Gateway close codes
//!
//! Codes carried on websocket close frames, both the standard ones the
//! client sends and the gateway-specific 4xxx codes the server sends.

/// Normal closure, sent on a deliberate disconnect
pub const CLOSE_NORMAL: u16 = 1000;

/// Service restart, sent when the server requested a reconnect (op 7)
pub const CLOSE_SERVICE_RESTART: u16 = 1012;

/// Gateway-specific close codes sent by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CloseCode {
    /// Unknown error occurred
    UnknownError = 4000,
    /// Invalid opcode sent
    UnknownOpcode = 4001,
    /// Invalid payload encoding
    DecodeError = 4002,
    /// Sent a payload before Identify
    NotAuthenticated = 4003,
    /// Invalid token provided
    AuthenticationFailed = 4004,
    /// Sent Identify twice
    AlreadyAuthenticated = 4005,
    /// Invalid sequence number for Resume
    InvalidSequence = 4007,
    /// Too many frames (rate limited)
    RateLimited = 4008,
    /// Session has timed out
    SessionTimeout = 4009,
    /// Invalid shard configuration
    InvalidShard = 4010,
    /// Sharding is required
    ShardingRequired = 4011,
}

impl CloseCode {
    /// Create a `CloseCode` from a raw integer value
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            4000 => Some(Self::UnknownError),
            4001 => Some(Self::UnknownOpcode),
            4002 => Some(Self::DecodeError),
            4003 => Some(Self::NotAuthenticated),
            4004 => Some(Self::AuthenticationFailed),
            4005 => Some(Self::AlreadyAuthenticated),
            4007 => Some(Self::InvalidSequence),
            4008 => Some(Self::RateLimited),
            4009 => Some(Self::SessionTimeout),
            4010 => Some(Self::InvalidShard),
            4011 => Some(Self::ShardingRequired),
            _ => None,
        }
    }

    /// Get the raw integer value
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Whether the session may be resumed after this close.
    ///
    /// Authentication and shard problems require operator intervention;
    /// everything else is worth a resume attempt.
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        !matches!(
            self,
            Self::AuthenticationFailed | Self::InvalidShard | Self::ShardingRequired
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_code_roundtrip() {
        assert_eq!(CloseCode::from_u16(4004), Some(CloseCode::AuthenticationFailed));
        assert_eq!(CloseCode::AuthenticationFailed.as_u16(), 4004);
        assert_eq!(CloseCode::from_u16(4042), None);
    }

    #[test]
    fn test_recoverability() {
        assert!(CloseCode::SessionTimeout.is_recoverable());
        assert!(CloseCode::RateLimited.is_recoverable());
        assert!(!CloseCode::AuthenticationFailed.is_recoverable());
        assert!(!CloseCode::ShardingRequired.is_recoverable());
    }
}
