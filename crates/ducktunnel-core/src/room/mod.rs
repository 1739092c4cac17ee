//! Rooms: one broadcast domain each.
//!
//! A [`Room`] owns the set of connections currently joined to it and fans
//! every broadcast out to all of them except the sender.
//!
//! # Locking
//!
//! Each room has its own `parking_lot::Mutex`, so contention is limited to the
//! clients of one room.  `join`, `leave` and `broadcast` hold the lock for
//! their whole critical section, including the per-peer sends.  That is safe
//! because [`Connection::send`] only enqueues: it never waits on the network.
//!
//! Holding the lock across the sends gives two properties:
//!
//! - Messages from one sender reach each recipient in send order.
//! - A join racing a broadcast is totally ordered with it.  A connection that
//!   joined before the broadcast took the lock receives the message; one that
//!   joined after does not.
//!
//! # Failure pruning
//!
//! A failed delivery means the peer is dead (closed writer) or stalled (full
//! queue).  The peer is removed during the same broadcast and returned to the
//! caller, which asks the transport to close it.

pub mod registry;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::connection::{Connection, ConnectionId};
use crate::domain::{Message, RoomId};

/// A named broadcast domain.
pub struct Room {
    id: RoomId,
    members: Mutex<HashMap<ConnectionId, Arc<dyn Connection>>>,
}

impl Room {
    /// Creates an empty room.
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            members: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// Adds `connection` to the member set and returns the new member count.
    ///
    /// Joining twice with the same handle is a no-op.
    pub fn join(&self, connection: Arc<dyn Connection>) -> usize {
        let mut members = self.members.lock();
        members.entry(connection.id()).or_insert(connection);
        members.len()
    }

    /// Removes the member with `id` if present and returns the member count
    /// afterwards.
    pub fn leave(&self, id: &ConnectionId) -> usize {
        let mut members = self.members.lock();
        members.remove(id);
        members.len()
    }

    /// Delivers `message` to every member except `sender`.
    ///
    /// Each delivery is attempted independently.  Members whose delivery
    /// fails are removed from the room and returned so the caller can close
    /// them.  The sender does not have to be a member.
    pub fn broadcast(&self, sender: &ConnectionId, message: &Message) -> Vec<Arc<dyn Connection>> {
        let (delivered, failed) = self.fan_out(sender, message);
        trace!(
            "room {}: broadcast from {sender} delivered to {delivered} member(s), {} pruned",
            self.id,
            failed.len()
        );
        failed
    }

    /// Returns the number of successful deliveries and the pruned members.
    fn fan_out(
        &self,
        sender: &ConnectionId,
        message: &Message,
    ) -> (usize, Vec<Arc<dyn Connection>>) {
        let mut delivered = 0;
        let mut failed = Vec::new();
        let mut members = self.members.lock();

        members.retain(|id, member| {
            if id == sender {
                return true;
            }
            match member.send(message) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(e) => {
                    warn!("room {}: delivery to {id} failed: {e}; pruning", self.id);
                    failed.push(Arc::clone(member));
                    false
                }
            }
        });

        (delivered, failed)
    }

    /// Current number of members.
    pub fn member_count(&self) -> usize {
        self.members.lock().len()
    }

    /// Whether `id` is currently a member.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members.lock().contains_key(id)
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("members", &self.member_count())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
