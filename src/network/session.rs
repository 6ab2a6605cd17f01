//! Player Session
//!
//! Connection-side state of one participant: the outbound message queue,
//! the room membership, the flood guard and the security-error counter.
//! Guarded by its own mutex, which is always taken before any room lock.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

use crate::game::player::Role;
use crate::network::protocol::ServerMessage;
use crate::game::room::Room;

// =============================================================================
// OUTBOUND QUEUE
// =============================================================================

/// Item consumed by a connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Write one message.
    Message(ServerMessage),
    /// Write `DISCONNECT` and close the write half.
    Close,
}

/// Sending half of a connection's outbound queue.
///
/// Sends never block, so room state methods can stay synchronous while
/// holding the room lock.
#[derive(Debug, Clone)]
pub struct Outbox {
    peer: SocketAddr,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Outbox {
    /// Create a queue for a peer.
    pub fn channel(peer: SocketAddr) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { peer, tx }, rx)
    }

    /// Queue a message. Dropped silently once the writer is gone.
    pub fn send(&self, message: ServerMessage) {
        if self.tx.send(Outbound::Message(message)).is_err() {
            debug!("Dropping message for closed connection {}", self.peer);
        }
    }

    /// Ask the writer to send `DISCONNECT` and stop.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    /// Check if the writer has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// =============================================================================
// FLOOD GUARD
// =============================================================================

/// Counts frames arriving in quick succession.
#[derive(Debug, Clone)]
pub struct FloodGuard {
    interval: Duration,
    threshold: u32,
    last_frame: Instant,
    burst: u32,
}

impl FloodGuard {
    /// Create a guard. `start` is treated as the previous frame's arrival.
    pub fn new(interval: Duration, threshold: u32, start: Instant) -> Self {
        Self { interval, threshold, last_frame: start, burst: 0 }
    }

    /// Record a frame arrival. Returns true once the burst reaches the threshold.
    pub fn record(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_frame) <= self.interval {
            self.burst += 1;
        } else {
            self.burst = 0;
        }
        self.last_frame = now;
        self.burst >= self.threshold
    }

    /// Current burst length.
    pub fn burst(&self) -> u32 {
        self.burst
    }
}

// =============================================================================
// PLAYER SESSION
// =============================================================================

/// Connection-side participant state.
#[derive(Debug)]
pub struct PlayerSession {
    outbox: Outbox,
    room: Option<Arc<Room>>,
    role: Option<Role>,
    flood: FloodGuard,
    security_errors: u32,
}

impl PlayerSession {
    /// Create a session for a freshly accepted connection.
    pub fn new(outbox: Outbox, flood: FloodGuard) -> Self {
        Self {
            outbox,
            room: None,
            role: None,
            flood,
            security_errors: 0,
        }
    }

    /// Outbound queue.
    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Queue a message for this player.
    pub fn send(&self, message: ServerMessage) {
        self.outbox.send(message);
    }

    /// Room this player sits in, if any.
    pub fn room(&self) -> Option<&Arc<Room>> {
        self.room.as_ref()
    }

    /// Seat in the current room.
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Check if the player has created or joined a room.
    pub fn in_room(&self) -> bool {
        self.room.is_some()
    }

    /// Bind the session to a room seat.
    pub fn enter_room(&mut self, room: Arc<Room>, role: Role) {
        self.room = Some(room);
        self.role = Some(role);
    }

    /// Drop the room binding, returning the room and seat if there was one.
    pub fn leave_room(&mut self) -> Option<(Arc<Room>, Role)> {
        let room = self.room.take()?;
        let role = self.role.take()?;
        Some((room, role))
    }

    /// Flood guard.
    pub fn flood_mut(&mut self) -> &mut FloodGuard {
        &mut self.flood
    }

    /// Count one security violation and return the new total.
    pub fn add_security_error(&mut self) -> u32 {
        self.security_errors += 1;
        self.security_errors
    }

    /// Security violations so far.
    pub fn security_errors(&self) -> u32 {
        self.security_errors
    }
}
