//! Network Layer
//!
//! TCP server, per-connection dispatch and the wire protocol.
//! Game rules live in `game/`; this layer routes frames to rooms.

pub mod connection;
pub mod handshake;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod server;

pub use connection::{Connection, Flow};
pub use handshake::HandshakeError;
pub use protocol::{ClientMessage, EventCode, Frame, FrameError, ServerMessage};
pub use registry::RoomRegistry;
pub use session::{FloodGuard, Outbound, Outbox, PlayerSession};
pub use server::{GameServer, GameServerError, ServerConfig};
