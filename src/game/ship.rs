//! Ships and Board Entities
//!
//! Entity kinds (four ship sizes plus the two reveal markers), orientation,
//! and the placed `Ship` with per-cell destruction tracking.
//!
//! Kind codes, sizes and quotas must match the client bit-for-bit.

use std::collections::BTreeSet;
use serde::{Serialize, Deserialize};

use crate::core::grid::{Footprint, GridError, Vec2};

// =============================================================================
// ENTITY KIND
// =============================================================================

/// Everything that can be drawn on a battlefield.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum EntityKind {
    /// Reveal marker: a destroyed cell.
    HitMark = 1,
    /// Reveal marker: a known-empty cell.
    EmptyCell = 2,
    /// Four-cell ship.
    FourDeck = 3,
    /// Three-cell ship.
    ThreeDeck = 4,
    /// Two-cell ship.
    TwoDeck = 5,
    /// Single-cell ship.
    OneDeck = 6,
}

impl EntityKind {
    /// All ship kinds a player must place.
    pub const SHIPS: [EntityKind; 4] = [
        EntityKind::FourDeck,
        EntityKind::ThreeDeck,
        EntityKind::TwoDeck,
        EntityKind::OneDeck,
    ];

    /// Long-axis length in cells.
    #[inline]
    pub const fn length(self) -> i32 {
        match self {
            EntityKind::FourDeck => 4,
            EntityKind::ThreeDeck => 3,
            EntityKind::TwoDeck => 2,
            EntityKind::OneDeck | EntityKind::HitMark | EntityKind::EmptyCell => 1,
        }
    }

    /// How many of this kind each player places. Zero for markers.
    #[inline]
    pub const fn quota(self) -> usize {
        match self {
            EntityKind::FourDeck => 1,
            EntityKind::ThreeDeck => 2,
            EntityKind::TwoDeck => 3,
            EntityKind::OneDeck => 4,
            EntityKind::HitMark | EntityKind::EmptyCell => 0,
        }
    }

    /// Check if a player may place this kind at all.
    #[inline]
    pub const fn is_placeable(self) -> bool {
        self.quota() > 0
    }

    /// Size when laid out horizontally.
    #[inline]
    pub const fn horizontal_size(self) -> Vec2 {
        Vec2::new(self.length(), 1)
    }
}

/// Total number of ships in a complete fleet.
pub fn fleet_size() -> usize {
    EntityKind::SHIPS.iter().map(|kind| kind.quota()).sum()
}

impl From<EntityKind> for u8 {
    fn from(kind: EntityKind) -> Self {
        kind as u8
    }
}

impl TryFrom<u8> for EntityKind {
    type Error = PlacementError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(EntityKind::HitMark),
            2 => Ok(EntityKind::EmptyCell),
            3 => Ok(EntityKind::FourDeck),
            4 => Ok(EntityKind::ThreeDeck),
            5 => Ok(EntityKind::TwoDeck),
            6 => Ok(EntityKind::OneDeck),
            other => Err(PlacementError::UnknownKind(other.into())),
        }
    }
}

// =============================================================================
// ORIENTATION
// =============================================================================

/// Which axis a ship's long side lies along.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Orientation {
    /// Extends toward +x from the anchor.
    #[default]
    Horizontal = 1,
    /// Extends toward -y from the anchor.
    Vertical = 2,
}

impl From<Orientation> for u8 {
    fn from(orientation: Orientation) -> Self {
        orientation as u8
    }
}

impl TryFrom<u8> for Orientation {
    type Error = PlacementError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Orientation::Horizontal),
            2 => Ok(Orientation::Vertical),
            other => Err(PlacementError::InvalidOrientation(other.into())),
        }
    }
}

// =============================================================================
// PLACEMENT ERRORS
// =============================================================================

/// Reasons a ship cannot be created or placed.
///
/// An honest client never triggers any of these, so the dispatcher reports
/// them as security violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    /// Unrecognized kind code.
    #[error("unknown entity type: {0}")]
    UnknownKind(i64),

    /// Unrecognized orientation code.
    #[error("incorrect entity orientation: {0}")]
    InvalidOrientation(i64),

    /// Footprint leaves the board.
    #[error("incorrect entity boundaries: {kind:?} at {anchor} spans {footprint:?}")]
    OutOfBounds {
        /// Kind being placed.
        kind: EntityKind,
        /// Requested anchor.
        anchor: Vec2,
        /// Resulting rectangle.
        footprint: Footprint,
    },

    /// Kind has no quota (reveal markers).
    #[error("entities of type {0:?} can't be placed")]
    NotPlaceable(EntityKind),

    /// Quota for the kind is used up.
    #[error("entities count of type {0:?} has exceeded limit")]
    QuotaExceeded(EntityKind),

    /// Ship touches an already placed ship.
    #[error("entity at {placed} intersects with entity at {existing}")]
    Intersects {
        /// Anchor of the rejected ship.
        placed: Vec2,
        /// Anchor of the ship it touches.
        existing: Vec2,
    },
}

// =============================================================================
// SHIP
// =============================================================================

/// A placed ship (or a marker, when built for display only).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ship {
    kind: EntityKind,
    anchor: Vec2,
    orientation: Orientation,
    footprint: Footprint,
    /// Destroyed cells as 1-indexed local offsets.
    destroyed: BTreeSet<Vec2>,
}

impl Ship {
    /// Create a ship, rejecting footprints that leave the board.
    pub fn new(kind: EntityKind, anchor: Vec2, orientation: Orientation) -> Result<Self, PlacementError> {
        let footprint = footprint_of(kind, anchor, orientation);
        if !footprint.within_bounds() {
            return Err(PlacementError::OutOfBounds { kind, anchor, footprint });
        }

        Ok(Self {
            kind,
            anchor,
            orientation,
            footprint,
            destroyed: BTreeSet::new(),
        })
    }

    /// Create a ship from raw wire codes. Codes wider than a byte are rejected
    /// the same way as unknown ones.
    pub fn from_placement(kind: i64, anchor: Vec2, orientation: i64) -> Result<Self, PlacementError> {
        let orientation = u8::try_from(orientation)
            .map_err(|_| PlacementError::InvalidOrientation(orientation))
            .and_then(Orientation::try_from)?;
        let kind = u8::try_from(kind)
            .map_err(|_| PlacementError::UnknownKind(kind))
            .and_then(EntityKind::try_from)?;
        Self::new(kind, anchor, orientation)
    }

    /// Ship kind.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Anchor cell (the "far" cell the client reports).
    pub fn anchor(&self) -> Vec2 {
        self.anchor
    }

    /// Orientation.
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Covered rectangle.
    pub fn footprint(&self) -> Footprint {
        self.footprint
    }

    /// Check if this ship touches another one, diagonals included.
    pub fn touches(&self, other: &Ship) -> bool {
        self.footprint.dilate(1).intersects(&other.footprint)
    }

    /// Map an absolute cell to a local offset inside the ship.
    pub fn to_local(&self, point: Vec2) -> Result<Vec2, GridError> {
        self.footprint.to_local(point)
    }

    /// Mark an absolute cell destroyed.
    ///
    /// Returns false if the cell is not part of the ship or was already destroyed.
    pub fn destroy_at(&mut self, point: Vec2) -> bool {
        match self.to_local(point) {
            Ok(local) => self.destroyed.insert(local),
            Err(_) => false,
        }
    }

    /// Number of destroyed cells.
    pub fn destroyed_count(&self) -> usize {
        self.destroyed.len()
    }

    /// True once every cell has been hit.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.len() == self.footprint.area()
    }
}

/// Rectangle covered by an entity of `kind` anchored at `anchor`.
///
/// Anchors come straight off the wire, so the far corner saturates at the
/// `i32` range instead of overflowing. Such footprints fail `within_bounds`.
pub fn footprint_of(kind: EntityKind, anchor: Vec2, orientation: Orientation) -> Footprint {
    let size = match orientation {
        Orientation::Horizontal => kind.horizontal_size(),
        Orientation::Vertical => kind.horizontal_size().transposed(),
    };

    Footprint::new(
        Vec2::new(anchor.x, anchor.y.saturating_sub(size.y - 1)),
        Vec2::new(anchor.x.saturating_add(size.x - 1), anchor.y),
    )
}
