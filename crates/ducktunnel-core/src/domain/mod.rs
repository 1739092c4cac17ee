//! Plain value types shared by the registry, rooms and sessions.
//!
//! Nothing in here locks, blocks or performs I/O.

pub mod message;
pub mod room_id;

pub use message::{Message, MessageError};
pub use room_id::RoomId;
