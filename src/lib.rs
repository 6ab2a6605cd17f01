//! # Sea Battle Server
//!
//! Authoritative session server for two-player sea battle over TCP.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SEA BATTLE SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Board primitives                          │
//! │  └── grid.rs     - Cell coordinates and rectangles           │
//! │                                                              │
//! │  game/           - Rules                                     │
//! │  ├── ship.rs     - Ship kinds, footprints, damage            │
//! │  ├── player.rs   - Fleet placement and shot bookkeeping      │
//! │  ├── state.rs    - Gamestate and phase ceilings              │
//! │  └── room.rs     - Room state machine and shot resolution    │
//! │                                                              │
//! │  network/        - Networking                                │
//! │  ├── server.rs   - TCP server, reader/writer tasks, sweeper  │
//! │  ├── connection.rs - Frame dispatch and lock hierarchy       │
//! │  ├── session.rs  - Per-connection player state               │
//! │  ├── registry.rs - Room handle -> room map                   │
//! │  ├── handshake.rs - Version gate and nickname rules          │
//! │  └── protocol.rs - Wire messages                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Authority
//!
//! Clients are untrusted. Every placement and shot is validated against the
//! room state under the room lock; only the server decides hits, sinks,
//! turns and winners.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::grid::{Footprint, Vec2, GRID_SIZE};
pub use game::player::{Player, Role, ShotOutcome};
pub use game::room::{Room, RoomError};
pub use game::ship::{EntityKind, Orientation, Ship};
pub use game::state::{Gamestate, RoomTimeouts};
pub use network::server::{GameServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol version clients must announce.
pub const PROTOCOL_VERSION: &str = "1.0.0";
