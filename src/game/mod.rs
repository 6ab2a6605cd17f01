//! Game Logic Module
//!
//! Sea battle rules and the per-room state machine.
//!
//! ## Module Structure
//!
//! - `ship`: Ship kinds, quotas, footprints, damage
//! - `player`: One participant's fleet and shot history
//! - `state`: Gamestate and phase ceilings
//! - `room`: Room state machine, turn and shot resolution

pub mod ship;
pub mod player;
pub mod state;
pub mod room;

// Re-export key types
pub use ship::{EntityKind, Orientation, PlacementError, Ship};
pub use player::{Player, Role, ShotOutcome};
pub use state::{Gamestate, RoomTimeouts};
pub use room::{Room, RoomError, RoomState};
