//! Application layer for ducktunnel-server.
//!
//! Transport rules that do not need a socket to test:
//!
//! - Which upgrade requests are accepted, and which room they ask for.
//! - How each inbound WebSocket frame maps onto the core session's stream of
//!   messages.

pub mod protocol;

pub use protocol::{classify_frame, room_from_request, HandshakeRejection, InboundFrame};
