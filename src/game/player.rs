//! Player Board
//!
//! The game-side half of a participant: name, role, fleet, the cells this
//! player has fired at, and the pending revenge flag. Lives inside a room
//! and is only touched under that room's lock.

use std::collections::BTreeSet;
use serde::{Serialize, Deserialize};

use crate::core::grid::Vec2;
use crate::game::ship::{fleet_size, EntityKind, PlacementError, Ship};

// =============================================================================
// ROLE
// =============================================================================

/// Seat a player occupies in a room. Fixed for the room's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Role {
    /// Room creator. Always shoots first.
    Primary = 1,
    /// Player who joined by handle.
    Secondary = 2,
}

impl Role {
    /// The other seat.
    #[inline]
    pub const fn opponent(self) -> Role {
        match self {
            Role::Primary => Role::Secondary,
            Role::Secondary => Role::Primary,
        }
    }
}

impl From<Role> for u8 {
    fn from(role: Role) -> Self {
        role as u8
    }
}

impl TryFrom<u8> for Role {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Role::Primary),
            2 => Ok(Role::Secondary),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

// =============================================================================
// SHOT OUTCOME
// =============================================================================

/// What a shot did to the defender's fleet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShotOutcome {
    /// No ship at the cell.
    Miss,
    /// Ship cell destroyed, ship still afloat.
    Hit,
    /// Last cell of the ship destroyed. Carries a snapshot of the sunk ship.
    Sunk(Ship),
    /// Cell was already destroyed; nothing changed.
    Repeat,
}

// =============================================================================
// PLAYER
// =============================================================================

/// One participant's board.
#[derive(Clone, Debug)]
pub struct Player {
    name: String,
    role: Role,
    ships: Vec<Ship>,
    /// Cells this player has fired at (including revealed buffers).
    shots: BTreeSet<Vec2>,
    revenge_requested: bool,
}

impl Player {
    /// Create an empty board.
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
            ships: Vec::new(),
            shots: BTreeSet::new(),
            revenge_requested: false,
        }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Seat.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Placed ships.
    pub fn ships(&self) -> &[Ship] {
        &self.ships
    }

    /// How many more ships of `kind` may be placed.
    pub fn remaining_quota(&self, kind: EntityKind) -> usize {
        let placed = self.ships.iter().filter(|s| s.kind() == kind).count();
        kind.quota().saturating_sub(placed)
    }

    /// Place a ship: kind must be placeable, within quota, and not touch any owned ship.
    pub fn add_ship(&mut self, ship: Ship) -> Result<(), PlacementError> {
        if !ship.kind().is_placeable() {
            return Err(PlacementError::NotPlaceable(ship.kind()));
        }
        if self.remaining_quota(ship.kind()) == 0 {
            return Err(PlacementError::QuotaExceeded(ship.kind()));
        }
        if let Some(existing) = self.ships.iter().find(|s| s.touches(&ship)) {
            return Err(PlacementError::Intersects {
                placed: ship.anchor(),
                existing: existing.anchor(),
            });
        }

        self.ships.push(ship);
        Ok(())
    }

    /// Place a whole fleet. Stops at the first failure and leaves the board empty.
    pub fn add_ships(&mut self, ships: impl IntoIterator<Item = Ship>) -> Result<(), PlacementError> {
        for ship in ships {
            if let Err(e) = self.add_ship(ship) {
                self.clear_ships();
                return Err(e);
            }
        }
        Ok(())
    }

    /// True when the complete fleet is on the board.
    pub fn is_built(&self) -> bool {
        self.ships.len() == fleet_size()
    }

    /// Reset fleet and shot history for a new building phase.
    pub fn clear_ships(&mut self) {
        self.ships.clear();
        self.shots.clear();
    }

    /// Check if this player already fired at a cell.
    pub fn has_shot_at(&self, point: Vec2) -> bool {
        self.shots.contains(&point)
    }

    /// Remember a cell as fired at. Returns false if it already was.
    pub fn mark_shot(&mut self, point: Vec2) -> bool {
        self.shots.insert(point)
    }

    /// Number of cells fired at.
    pub fn shot_count(&self) -> usize {
        self.shots.len()
    }

    /// Apply an incoming shot to this player's fleet.
    pub fn record_shot_received(&mut self, point: Vec2) -> ShotOutcome {
        let Some(ship) = self.ships.iter_mut().find(|s| s.footprint().contains(point)) else {
            return ShotOutcome::Miss;
        };

        if !ship.destroy_at(point) {
            return ShotOutcome::Repeat;
        }

        if ship.is_destroyed() {
            ShotOutcome::Sunk(ship.clone())
        } else {
            ShotOutcome::Hit
        }
    }

    /// True when every owned ship is sunk.
    pub fn is_annihilated(&self) -> bool {
        self.ships.iter().all(Ship::is_destroyed)
    }

    /// Pending revenge flag.
    pub fn revenge_requested(&self) -> bool {
        self.revenge_requested
    }

    /// Set or clear the revenge flag.
    pub fn set_revenge_requested(&mut self, requested: bool) {
        self.revenge_requested = requested;
    }
}

/// A valid complete fleet, used by tests across the crate.
#[cfg(test)]
pub(crate) fn standard_fleet() -> Vec<Ship> {
    use crate::game::ship::Orientation::{Horizontal, Vertical};

    let layout = [
        (EntityKind::FourDeck, 1, 1, Horizontal),
        (EntityKind::ThreeDeck, 1, 3, Horizontal),
        (EntityKind::ThreeDeck, 5, 3, Horizontal),
        (EntityKind::TwoDeck, 1, 5, Horizontal),
        (EntityKind::TwoDeck, 4, 5, Horizontal),
        (EntityKind::TwoDeck, 7, 5, Horizontal),
        (EntityKind::OneDeck, 1, 7, Horizontal),
        (EntityKind::OneDeck, 3, 7, Horizontal),
        (EntityKind::OneDeck, 5, 7, Horizontal),
        (EntityKind::OneDeck, 10, 10, Vertical),
    ];

    layout
        .into_iter()
        .map(|(kind, x, y, orientation)| Ship::new(kind, Vec2::new(x, y), orientation).unwrap())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::ship::Orientation;

    fn one_deck(x: i32, y: i32) -> Ship {
        Ship::new(EntityKind::OneDeck, Vec2::new(x, y), Orientation::Horizontal).unwrap()
    }

    #[test]
    fn test_standard_fleet_builds() {
        let mut player = Player::new("Alice", Role::Primary);
        player.add_ships(standard_fleet()).unwrap();
        assert!(player.is_built());
        assert!(!player.is_annihilated());
    }

    #[test]
    fn test_quota_enforced() {
        let mut player = Player::new("Alice", Role::Primary);
        for x in [1, 3, 5, 7] {
            player.add_ship(one_deck(x, 1)).unwrap();
        }
        assert_eq!(player.remaining_quota(EntityKind::OneDeck), 0);
        assert_eq!(
            player.add_ship(one_deck(9, 9)),
            Err(PlacementError::QuotaExceeded(EntityKind::OneDeck))
        );
    }

    #[test]
    fn test_markers_not_placeable() {
        let mut player = Player::new("Alice", Role::Primary);
        let marker = Ship::new(EntityKind::HitMark, Vec2::new(1, 1), Orientation::Horizontal).unwrap();
        assert_eq!(
            player.add_ship(marker),
            Err(PlacementError::NotPlaceable(EntityKind::HitMark))
        );
    }

    #[test]
    fn test_adjacent_rejected() {
        let mut player = Player::new("Alice", Role::Primary);
        player.add_ship(one_deck(5, 5)).unwrap();
        assert!(matches!(
            player.add_ship(one_deck(6, 6)),
            Err(PlacementError::Intersects { .. })
        ));
        assert!(player.add_ship(one_deck(7, 7)).is_ok());
    }

    #[test]
    fn test_batch_failure_clears() {
        let mut player = Player::new("Alice", Role::Primary);
        let batch = vec![one_deck(1, 1), one_deck(3, 3), one_deck(3, 4)];
        assert!(player.add_ships(batch).is_err());
        assert!(player.ships().is_empty());
    }

    #[test]
    fn test_shot_outcomes() {
        let mut player = Player::new("Bob", Role::Secondary);
        player.add_ship(Ship::new(EntityKind::TwoDeck, Vec2::new(1, 1), Orientation::Horizontal).unwrap()).unwrap();
        player.add_ship(one_deck(5, 5)).unwrap();

        assert_eq!(player.record_shot_received(Vec2::new(9, 9)), ShotOutcome::Miss);
        assert_eq!(player.record_shot_received(Vec2::new(1, 1)), ShotOutcome::Hit);
        assert_eq!(player.record_shot_received(Vec2::new(1, 1)), ShotOutcome::Repeat);
        assert!(matches!(player.record_shot_received(Vec2::new(2, 1)), ShotOutcome::Sunk(_)));
        assert!(!player.is_annihilated());

        match player.record_shot_received(Vec2::new(5, 5)) {
            ShotOutcome::Sunk(ship) => assert_eq!(ship.kind(), EntityKind::OneDeck),
            other => panic!("expected sink, got {:?}", other),
        }
        assert!(player.is_annihilated());
    }

    #[test]
    fn test_clear_resets_shots() {
        let mut player = Player::new("Alice", Role::Primary);
        assert!(player.mark_shot(Vec2::new(2, 2)));
        assert!(!player.mark_shot(Vec2::new(2, 2)));
        assert!(player.has_shot_at(Vec2::new(2, 2)));

        player.clear_ships();
        assert!(!player.has_shot_at(Vec2::new(2, 2)));
        assert_eq!(player.shot_count(), 0);
    }

    #[test]
    fn test_role_wire_codes() {
        assert_eq!(serde_json::to_string(&Role::Secondary).unwrap(), "2");
        assert_eq!(Role::Primary.opponent(), Role::Secondary);
    }
}
