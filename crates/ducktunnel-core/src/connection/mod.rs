//! The seam between the core and the transport layer.
//!
//! A [`Connection`] is the core's handle on one client's duplex channel.  The
//! transport creates it, owns the underlying socket, and decides how a message
//! actually reaches the wire.  Rooms keep an `Arc<dyn Connection>` only while
//! the client is a member.
//!
//! # Non-blocking delivery
//!
//! [`Connection::send`] must not wait on the network.  Rooms call it while
//! holding their member-set lock, so a stalled peer must fail fast (for
//! example with a full bounded queue) instead of stalling every other member
//! of the room.
//!
//! # Testability
//!
//! [`mock::MockConnection`] records what it is sent and can be told to fail,
//! so rooms and sessions can be tested without sockets.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::domain::Message;

pub mod mock;

/// Process-unique identity of one connection handle.
///
/// Two handles are the same member if and only if they carry the same id;
/// nothing about the messages or the peer address is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Reason a message could not be handed to a peer.
///
/// Either way, the room treats the peer as dead and prunes it.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The peer's writer has gone away.
    #[error("peer connection is closed")]
    Closed,

    /// The peer is not draining its outbound queue fast enough.
    #[error("peer outbound queue is full")]
    Backpressure,
}

/// A client's duplex message channel, as seen by the core.
pub trait Connection: Send + Sync {
    /// Identity used for membership and self-delivery checks.
    fn id(&self) -> ConnectionId;

    /// Queues `message` for delivery to this peer without blocking.
    fn send(&self, message: &Message) -> Result<(), DeliveryError>;

    /// Asks the transport to tear the channel down.  Must be idempotent.
    fn close(&self);
}
