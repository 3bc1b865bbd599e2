//! Tilestep Engine -- the platformer simulation built on [`tilestep_core`].
//!
//! This crate turns the core building blocks into a playable world:
//!
//! - [`world::World`] runs one level, tick by tick, in a fixed order:
//!   input, behaviour, integration, collision, interactions.
//! - [`player`] and [`enemy`] drive their entities through
//!   [`StateMachine`](tilestep_core::state_machine::StateMachine)s.
//! - [`simulation::Simulation`] is what a host talks to: it owns the clock and
//!   the game-flow machine (loading, menus, pause, level transitions) and turns
//!   each frame callback into ticks plus a [`snapshot::RenderSnapshot`].
//! - [`replay`] and [`save`] record runs for determinism checks and persist
//!   progress between sessions.
//!
//! # Quick Start
//!
//! ```
//! use tilestep_engine::prelude::*;
//!
//! let level = LevelDescriptor::new(
//!     "demo",
//!     &["........", "........", "########"],
//!     Vec2::new(24.0, 32.0),
//! );
//!
//! let mut sim = Simulation::new(
//!     SimConfig::default(),
//!     Box::new(InMemoryLevels::new("demo", vec![level])),
//!     Box::new(MemoryStore::default()),
//! );
//! sim.start_new_game();
//!
//! // 60 frames at 60 Hz: load the level, then play.
//! let mut snapshot = sim.frame(0.0, TimeUnit::Seconds);
//! for i in 1..=60 {
//!     snapshot = sim.frame(i as f64 / 60.0, TimeUnit::Seconds);
//! }
//! assert_eq!(snapshot.flow, FlowState::Playing);
//! assert!(snapshot.entities.iter().any(|e| e.kind == EntityKind::Player));
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod enemy;
pub mod flow;
pub mod level;
pub mod loader;
pub mod player;
pub mod replay;
pub mod save;
pub mod simulation;
pub mod snapshot;
pub mod world;

/// Re-export the core crate for convenience.
pub use tilestep_core;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced while configuring the engine or loading content.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A configuration document could not be parsed.
    #[error("invalid configuration JSON: {0}")]
    ConfigParse(#[source] serde_json::Error),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A level document could not be parsed.
    #[error("level `{id}` is not valid JSON: {source}")]
    LevelParse {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// A level parsed but describes an impossible layout.
    #[error("level `{id}` is invalid: {reason}")]
    InvalidLevel { id: String, reason: String },

    /// No level with this identifier exists in the source.
    #[error("level `{0}` not found")]
    LevelNotFound(String),

    /// Reading a level or writing a save failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The worker delivering an asynchronous load went away without a result.
    #[error("load of `{0}` was abandoned by its worker")]
    LoadDisconnected(String),

    /// A value could not be encoded for storage.
    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Tile grid construction failed.
    #[error(transparent)]
    Core(#[from] tilestep_core::CoreError),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use tilestep_core::prelude::*;

    pub use crate::config::{PlayerConfig, SimConfig};
    pub use crate::enemy::{Behavior, Enemy, EnemyKind, EnemyParams, EnemyTuning};
    pub use crate::flow::{FlowSignals, FlowState};
    pub use crate::level::{
        EnemySpawn, Level, LevelDescriptor, PickupKind, PickupSpawn,
    };
    pub use crate::loader::{DirectoryLevels, InMemoryLevels, LevelSource, LoadPoll, PendingLoad};
    pub use crate::player::{DamageOutcome, Player, PowerState};
    pub use crate::replay::{
        replay, ReplayDivergence, ReplayEntry, ReplayLog, ReplayRecorder, ReplayResult,
    };
    pub use crate::save::{FileStore, MemoryStore, SaveData, SaveStore};
    pub use crate::simulation::Simulation;
    pub use crate::snapshot::{EntityKind, EntitySnapshot, RenderSnapshot, VisualState};
    pub use crate::world::{Progress, SimulationContext, TickReport, World, WorldEvent};
    pub use crate::EngineError;
}
