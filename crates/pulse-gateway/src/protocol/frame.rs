//! Gateway frame format
//!
//! All traffic on the websocket is a frame of shape `{op, d, s?, t?}`.
//! Inbound frames keep their payload as raw JSON so it can be decoded
//! lazily once the dispatch type is known; binary frames are
//! zlib-compressed JSON.

use super::OpCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::io::Read;

/// An inbound gateway frame
#[derive(Debug, Deserialize)]
pub struct GatewayFrame {
    /// Operation code
    pub op: OpCode,

    /// Sequence number (only for op=0 Dispatch)
    #[serde(default)]
    pub s: Option<u64>,

    /// Event type (only for op=0 Dispatch)
    #[serde(default)]
    pub t: Option<String>,

    /// Raw event payload, decoded lazily by type
    #[serde(default)]
    pub d: Option<Box<RawValue>>,
}

impl GatewayFrame {
    /// Parse a frame from a JSON text message
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Parse a frame from a zlib-compressed binary message
    pub fn parse_compressed(bytes: &[u8]) -> Result<Self, crate::error::GatewayError> {
        let mut decoder = flate2::read::ZlibDecoder::new(bytes);
        let mut text = String::new();
        decoder.read_to_string(&mut text)?;
        Ok(Self::parse(&text)?)
    }

    /// Decode the payload into a typed struct
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.d {
            Some(raw) => serde_json::from_str(raw.get()),
            None => serde_json::from_str("null"),
        }
    }

    /// The dispatch event type, when present
    #[must_use]
    pub fn event_type(&self) -> Option<&str> {
        self.t.as_deref()
    }
}

impl std::fmt::Display for GatewayFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.t, self.s) {
            (Some(t), Some(s)) => write!(f, "GatewayFrame(op={}, t={t}, s={s})", self.op),
            _ => write!(f, "GatewayFrame(op={})", self.op),
        }
    }
}

/// An outbound gateway frame
#[derive(Debug, Serialize)]
pub struct OutboundFrame<T> {
    /// Operation code
    pub op: OpCode,
    /// Payload
    pub d: T,
}

impl<T: Serialize> OutboundFrame<T> {
    /// Create an outbound frame
    #[must_use]
    pub fn new(op: OpCode, d: T) -> Self {
        Self { op, d }
    }

    /// Serialize to JSON text
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
