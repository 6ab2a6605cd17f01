//! Room Registry
//!
//! Process-wide map from room handle to room. The registry lock is a leaf
//! in the lock hierarchy: it is never held while a room lock is acquired.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::info;

use crate::game::room::Room;
use crate::game::state::RoomTimeouts;
use crate::network::protocol::ServerMessage;
use crate::network::session::Outbox;

/// Live rooms keyed by handle.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: RwLock<BTreeMap<String, Arc<Room>>>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room with `creator` in the primary seat and register it.
    pub async fn create_room(&self, creator: &str, outbox: Outbox, timeouts: RoomTimeouts) -> Arc<Room> {
        let handle = uuid::Uuid::new_v4().to_string();
        let room = Arc::new(Room::new(handle.clone(), creator, outbox, timeouts));

        let mut rooms = self.rooms.write().await;
        rooms.insert(handle, room.clone());

        room
    }

    /// Look up a room by handle.
    pub async fn get_room(&self, handle: &str) -> Option<Arc<Room>> {
        let rooms = self.rooms.read().await;
        rooms.get(handle).cloned()
    }

    /// Remove a room. The handle is never reused.
    pub async fn remove_room(&self, handle: &str) -> Option<Arc<Room>> {
        let mut rooms = self.rooms.write().await;
        rooms.remove(handle)
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.len()
    }

    /// Snapshot of all rooms, taken without holding the lock afterwards.
    pub async fn rooms(&self) -> Vec<Arc<Room>> {
        let rooms = self.rooms.read().await;
        rooms.values().cloned().collect()
    }

    /// Destroy rooms past their phase ceiling and drop rooms already closed.
    /// Returns the number of rooms removed.
    pub async fn sweep(&self, now: Instant) -> usize {
        let mut removed = 0;

        for room in self.rooms().await {
            let mut state = room.lock().await;
            if !state.is_closed() && state.expired(now) {
                info!(room = %room.handle(), "Room timed out in {:?}", state.gamestate());
                state.announce(ServerMessage::TimeoutExceeded);
                state.destroy();
            }

            if state.is_closed() && self.remove_room(room.handle()).await.is_some() {
                removed += 1;
            }
        }

        removed
    }
}
