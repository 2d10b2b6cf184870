//! Gateway connection layer for the Pulse real-time API.
//!
//! Maintains the websocket session: the hello/identify handshake,
//! heartbeating, sequence tracking, resume-or-identify reconnection and
//! typed event delivery. [`Client`] bundles this with the REST layer.

pub mod client;
pub mod error;
pub mod events;
pub mod protocol;
mod reconnect;
pub mod session;

pub use client::Client;
pub use error::GatewayError;
pub use events::{event_type, EventPayload, EventRouter, GatewayEvent};
pub use session::GatewaySession;
