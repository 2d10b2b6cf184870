//! Decoder registry
//!
//! Maps wire type strings to payload decoders. Adding an event kind is
//! additive: register a decoder and the router starts producing typed
//! payloads for it, with no dispatch switch to grow.

use super::types::{event_type, EventPayload};
use dashmap::DashMap;
use serde_json::value::RawValue;

/// A payload decoder for one event type
pub type DecoderFn = fn(&RawValue) -> Result<EventPayload, serde_json::Error>;

/// Registry of payload decoders keyed by wire type string
pub struct DecoderRegistry {
    decoders: DashMap<String, DecoderFn>,
}

impl DecoderRegistry {
    /// Create a registry with the built-in event kinds registered
    #[must_use]
    pub fn new() -> Self {
        let registry = Self {
            decoders: DashMap::new(),
        };
        registry.register(event_type::READY, |raw| {
            Ok(EventPayload::Ready(serde_json::from_str(raw.get())?))
        });
        registry.register(event_type::RESUMED, |_| Ok(EventPayload::Resumed));
        registry.register(event_type::MESSAGE_CREATE, |raw| {
            Ok(EventPayload::MessageCreate(serde_json::from_str(raw.get())?))
        });
        registry.register(event_type::MESSAGE_UPDATE, |raw| {
            Ok(EventPayload::MessageUpdate(serde_json::from_str(raw.get())?))
        });
        registry.register(event_type::MESSAGE_DELETE, |raw| {
            Ok(EventPayload::MessageDelete(serde_json::from_str(raw.get())?))
        });
        registry.register(event_type::PRESENCE_UPDATE, |raw| {
            Ok(EventPayload::PresenceUpdate(serde_json::from_str(raw.get())?))
        });
        registry.register(event_type::TYPING_START, |raw| {
            Ok(EventPayload::TypingStart(serde_json::from_str(raw.get())?))
        });
        registry
    }

    /// Register (or replace) the decoder for an event type
    pub fn register(&self, event_type: &str, decoder: DecoderFn) {
        self.decoders.insert(event_type.to_string(), decoder);
    }

    /// Decode a dispatch payload.
    ///
    /// Types without a decoder come back as [`EventPayload::Unknown`];
    /// a decoder failure is an error the caller logs and drops without
    /// tearing the connection down.
    pub fn decode(
        &self,
        event_type: &str,
        raw: Option<&RawValue>,
    ) -> Result<EventPayload, serde_json::Error> {
        match (self.decoders.get(event_type), raw) {
            (Some(decoder), Some(raw)) => decoder(raw),
            (Some(decoder), None) => {
                // Payload-less dispatch (e.g. RESUMED); decode from null.
                let null = serde_json::from_str::<&RawValue>("null")?;
                decoder(null)
            }
            (None, raw) => Ok(EventPayload::Unknown {
                event_type: event_type.to_string(),
                data: match raw {
                    Some(raw) => serde_json::from_str(raw.get())?,
                    None => serde_json::Value::Null,
                },
            }),
        }
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
