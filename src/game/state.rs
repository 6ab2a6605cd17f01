//! Room Phase Definitions
//!
//! The gamestate a room can be in, and how long a room may stay in each one.

use std::time::Duration;
use serde::{Serialize, Deserialize};

// =============================================================================
// GAMESTATE
// =============================================================================

/// Room lifecycle phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Gamestate {
    /// Lobby: waiting for the second player (or a revenge restart).
    #[default]
    Initial = 1,
    /// Ship placement.
    Building = 2,
    /// Alternating shots.
    Playing = 3,
    /// Somebody won; waiting for revenge requests.
    Over = 4,
}

impl From<Gamestate> for u8 {
    fn from(state: Gamestate) -> Self {
        state as u8
    }
}

impl TryFrom<u8> for Gamestate {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Gamestate::Initial),
            2 => Ok(Gamestate::Building),
            3 => Ok(Gamestate::Playing),
            4 => Ok(Gamestate::Over),
            other => Err(format!("unknown gamestate: {other}")),
        }
    }
}

// =============================================================================
// PHASE TIMEOUTS
// =============================================================================

/// Maximum time a room may spend in each gamestate before it is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomTimeouts {
    /// Lobby wait.
    pub initial: Duration,
    /// Ship placement.
    pub building: Duration,
    /// Active match.
    pub playing: Duration,
    /// Waiting for both revenge requests.
    pub over: Duration,
}

impl Default for RoomTimeouts {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(10 * 60),
            building: Duration::from_secs(10 * 60),
            playing: Duration::from_secs(60 * 60),
            over: Duration::from_secs(3 * 60),
        }
    }
}

impl RoomTimeouts {
    /// Ceiling for a gamestate.
    pub fn ceiling(&self, state: Gamestate) -> Duration {
        match state {
            Gamestate::Initial => self.initial,
            Gamestate::Building => self.building,
            Gamestate::Playing => self.playing,
            Gamestate::Over => self.over,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_over_ceiling_is_shortest() {
        let timeouts = RoomTimeouts::default();
        assert!(timeouts.ceiling(Gamestate::Over) < timeouts.ceiling(Gamestate::Initial));
        assert_eq!(timeouts.ceiling(Gamestate::Playing), Duration::from_secs(3600));
    }

    #[test]
    fn test_gamestate_wire_codes() {
        assert_eq!(serde_json::to_string(&Gamestate::Playing).unwrap(), "3");
        assert!(Gamestate::try_from(5).is_err());
    }
}
