//! Gateway error types

use thiserror::Error;

/// Errors produced by the gateway connection
#[derive(Debug, Error)]
pub enum GatewayError {
    /// `open` was called while a connection is already up
    #[error("websocket connection already open")]
    AlreadyOpen,

    /// An operation needed a live connection and there was none
    #[error("no websocket connection exists")]
    NotConnected,

    /// Shard index is outside the declared shard count
    #[error("shard index {index} is out of range for shard count {count}")]
    ShardBounds { index: u32, count: u32 },

    /// The server broke the handshake contract
    #[error("protocol violation: expected {expected}, got {got}")]
    Protocol {
        expected: &'static str,
        got: String,
    },

    /// A presence status outside the allowed set was requested
    #[error("invalid presence status {status:?}")]
    InvalidStatus { status: String },

    /// Underlying websocket failure
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A frame failed to parse or serialize
    #[error("payload decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A compressed frame failed to inflate
    #[error("zlib decompression error: {0}")]
    Decompress(#[from] std::io::Error),

    /// A REST call made on the gateway's behalf failed
    #[error(transparent)]
    Rest(#[from] pulse_rest::RestError),
}

impl GatewayError {
    /// Whether the supervisor should attempt reconnection after this error
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::AlreadyOpen | Self::ShardBounds { .. } | Self::InvalidStatus { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverability() {
        assert!(!GatewayError::AlreadyOpen.is_recoverable());
        assert!(!GatewayError::ShardBounds { index: 4, count: 4 }.is_recoverable());
        assert!(GatewayError::NotConnected.is_recoverable());
    }
}
