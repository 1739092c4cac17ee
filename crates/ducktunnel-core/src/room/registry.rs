//! Registry: the process-wide directory of rooms.
//!
//! Construct one [`Registry`] at startup and hand an `Arc<Registry>` to every
//! connection handler.  Rooms are created on first use and are never removed,
//! so an emptied room is reused when a client comes back to the same id.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::Room;
use crate::domain::RoomId;

/// Map from room id to [`Room`], safe for concurrent use.
#[derive(Default)]
pub struct Registry {
    rooms: RwLock<HashMap<RoomId, Arc<Room>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the room for `id`, creating an empty one if none exists.
    ///
    /// Concurrent first calls for the same id all receive the same instance:
    /// the insert happens under the write lock after a second lookup.  The
    /// lock is released before this returns, so callers never hold it while
    /// operating on the room.
    pub fn get_or_create(&self, id: &RoomId) -> Arc<Room> {
        {
            let rooms = self.rooms.read();
            if let Some(room) = rooms.get(id) {
                return Arc::clone(room);
            }
        }

        let mut rooms = self.rooms.write();
        let room = rooms.entry(id.clone()).or_insert_with(|| {
            debug!("creating room {id}");
            Arc::new(Room::new(id.clone()))
        });
        Arc::clone(room)
    }

    /// Looks up an existing room without creating it.
    pub fn get(&self, id: &str) -> Option<Arc<Room>> {
        self.rooms.read().get(id).cloned()
    }

    /// Number of rooms ever created (empty rooms included).
    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
