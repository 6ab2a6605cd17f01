//! Core board primitives.
//!
//! Pure value types shared by the rules and the wire protocol.

pub mod grid;

pub use grid::{Footprint, GridError, Vec2, GRID_SIZE};
