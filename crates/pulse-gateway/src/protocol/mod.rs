//! Gateway wire protocol
//!
//! Frame envelope, operation codes, handshake payloads and close codes.

mod close_codes;
mod frame;
mod opcodes;
mod payloads;

pub use close_codes::{CloseCode, CLOSE_NORMAL, CLOSE_SERVICE_RESTART};
pub use frame::{GatewayFrame, OutboundFrame};
pub use opcodes::OpCode;
pub use payloads::{Hello, Identify, IdentifyProperties, PresenceUpdate, Resume};
