//! Typed events, decoding and delivery.

mod registry;
mod router;
mod types;

pub use registry::{DecoderFn, DecoderRegistry};
pub use router::{EventRouter, Handler};
pub use types::{
    event_type, EventPayload, GatewayEvent, Message, MessageDelete, PresenceUpdateEvent, Ready,
    TypingStart, User,
};
