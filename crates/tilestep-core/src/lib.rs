//! Tilestep Core -- deterministic building blocks for a 2D tile platformer.
//!
//! This crate holds everything the simulation needs that does not know about
//! players, enemies or levels:
//!
//! - [`clock::Clock`] -- fixed-step accumulator with spiral-of-death clamping
//!   and a render interpolation alpha.
//! - [`input::InputBuffer`] -- most-recent-press buffer with a bounded
//!   consumption window (input buffering).
//! - [`physics::PhysicsBody`] -- semi-implicit Euler integrator with coyote
//!   time and variable-height jumps.
//! - [`collision::resolve`] -- swept, axis-separated AABB vs tile grid
//!   resolution with one-way platforms.
//! - [`state_machine::StateMachine`] -- generic enter/exit/update state
//!   machine shared by every behavior in the engine.
//!
//! # Quick Start
//!
//! ```
//! use tilestep_core::prelude::*;
//!
//! let grid = TileGrid::from_ascii(16.0, &[
//!     "....",
//!     "....",
//!     "####",
//! ]).unwrap();
//!
//! let mut body = PhysicsBody::default();
//! let physics = PhysicsConfig::default();
//! let mut aabb = Aabb::new(20.0, 0.0, 12.0, 16.0);
//!
//! for _ in 0..60 {
//!     body.integrate(1.0 / 60.0, &physics);
//!     let res = resolve(&aabb, body.velocity(), &grid, 1.0 / 60.0);
//!     aabb = res.aabb;
//!     body.set_velocity(res.velocity);
//!     body.apply_contacts(res.contacts, 1.0 / 60.0);
//! }
//!
//! assert!(body.on_ground);
//! assert_eq!(aabb.bottom(), 32.0);
//! ```

#![deny(unsafe_code)]

pub mod clock;
pub mod collision;
pub mod geometry;
pub mod input;
pub mod physics;
pub mod state_machine;
pub mod tile;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced while building core data structures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    /// Tile size must be a positive, finite number of world units.
    #[error("tile size must be positive and finite, got {0}")]
    InvalidTileSize(f64),

    /// A tile grid was built from a tile vector of the wrong length.
    #[error("tile grid is {columns}x{rows} but {actual} tiles were supplied")]
    DimensionMismatch {
        columns: usize,
        rows: usize,
        actual: usize,
    },

    /// Rows of an ASCII level have different widths.
    #[error("row {row} is {actual} tiles wide, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// An ASCII level contains a character with no tile meaning.
    #[error("unknown tile glyph {glyph:?} at column {column}, row {row}")]
    UnknownGlyph {
        glyph: char,
        column: usize,
        row: usize,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::clock::{Clock, ClockAdvance, ClockConfig, TimeUnit};
    pub use crate::collision::{resolve, Contacts, Resolution};
    pub use crate::geometry::{Aabb, Vec2};
    pub use crate::input::{Action, ControlState, InputBuffer, InputConfig, InputEvent, InputQueue};
    pub use crate::physics::{PhysicsBody, PhysicsConfig};
    pub use crate::state_machine::{StateHandlers, StateMachine, TransitionOutcome};
    pub use crate::tile::{line_of_sight, Tile, TileGrid, TileQuery};
    pub use crate::CoreError;
}
