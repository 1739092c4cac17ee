//! # ducktunnel-core
//!
//! Room registry and broadcast fan-out for the ducktunnel relay.
//!
//! Clients hold persistent duplex connections, join one named room each, and
//! every message a client sends is delivered to all *other* members of that
//! room.  This crate owns the only shared mutable state in the system:
//!
//! - **`room::registry`** – the process-wide map from room id to [`Room`].
//!   Rooms are created on first join and never removed.
//! - **`room`** – one broadcast domain: a member set guarded by its own lock,
//!   with join / leave / broadcast.
//! - **`session`** – the per-connection control loop that joins a room,
//!   relays every received message, and leaves exactly once.
//!
//! It has no dependency on sockets or on any particular async runtime.  The
//! transport layer (see `ducktunnel-server`) plugs in through the
//! [`Connection`] trait and feeds received messages to [`Session::run`] as a
//! `Stream`.
//!
//! # Lock discipline
//!
//! ```text
//! Session ──get_or_create──▶ Registry (RwLock, lookup-or-insert only)
//!    │
//!    └──join/leave/broadcast──▶ Room (Mutex per room, non-blocking sends)
//! ```
//!
//! The registry lock is always released before any room operation starts, so
//! the two locks are never held together.

pub mod connection;
pub mod domain;
pub mod room;
pub mod session;

pub use connection::{Connection, ConnectionId, DeliveryError};
pub use domain::message::{Message, MessageError};
pub use domain::room_id::RoomId;
pub use room::registry::Registry;
pub use room::Room;
pub use session::{Session, SessionError, SessionState, SessionSummary};
