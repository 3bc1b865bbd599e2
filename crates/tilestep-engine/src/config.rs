//! Tuning configuration for the whole simulation.
//!
//! Every constant lives in a plain struct with a `Default` implementation.
//! All of them deserialize with `#[serde(default)]`, so a JSON document only
//! needs to name the values it overrides:
//!
//! ```
//! use tilestep_engine::config::SimConfig;
//!
//! let config = SimConfig::from_json_str(r#"{ "physics": { "gravity": 1200.0 } }"#).unwrap();
//! assert_eq!(config.physics.gravity, 1200.0);
//! assert_eq!(config.input.buffer_window, 0.15);
//! ```

use serde::{Deserialize, Serialize};
use tilestep_core::clock::ClockConfig;
use tilestep_core::input::InputConfig;
use tilestep_core::physics::PhysicsConfig;

use crate::enemy::EnemyTuning;
use crate::EngineError;

// ---------------------------------------------------------------------------
// PlayerConfig
// ---------------------------------------------------------------------------

/// Player movement, combat and session tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Horizontal speed at full stick deflection.
    pub walk_speed: f64,
    /// Horizontal speed during a dash.
    pub dash_speed: f64,
    /// How long a dash lasts.
    pub dash_duration: f64,
    /// Time after a dash starts before another one is allowed.
    pub dash_cooldown: f64,
    /// Damage immunity after losing a power level or respawning.
    pub invulnerability: f64,
    /// Upward velocity after stomping an enemy (negative is up).
    pub stomp_bounce: f64,
    pub fireball_speed: f64,
    pub fireball_cooldown: f64,
    pub fireball_lifetime: f64,
    /// Fireballs alive at once, per player. Zero disables throwing.
    pub max_fireballs: usize,
    pub starting_lives: u32,
    /// How far below the bottom of the grid the player may fall before the
    /// fall counts as a death.
    pub fall_death_margin: f64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            walk_speed: 120.0,
            dash_speed: 360.0,
            dash_duration: 0.15,
            dash_cooldown: 0.6,
            invulnerability: 1.5,
            stomp_bounce: -300.0,
            fireball_speed: 300.0,
            fireball_cooldown: 0.35,
            fireball_lifetime: 1.5,
            max_fireballs: 2,
            starting_lives: 3,
            fall_death_margin: 64.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Points awarded for each kind of event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreTable {
    pub coin: u64,
    pub power_up: u64,
    pub stomp: u64,
    pub fireball_kill: u64,
    pub level_complete: u64,
}

impl Default for ScoreTable {
    fn default() -> Self {
        Self {
            coin: 10,
            power_up: 1000,
            stomp: 100,
            fireball_kill: 200,
            level_complete: 500,
        }
    }
}

// ---------------------------------------------------------------------------
// SimConfig
// ---------------------------------------------------------------------------

/// Everything the simulation can be tuned with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub clock: ClockConfig,
    pub input: InputConfig,
    pub physics: PhysicsConfig,
    pub player: PlayerConfig,
    pub enemies: EnemyTuning,
    pub scores: ScoreTable,
    /// Seconds the level-complete screen stays up before moving on.
    pub level_complete_delay: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            clock: ClockConfig::default(),
            input: InputConfig::default(),
            physics: PhysicsConfig::default(),
            player: PlayerConfig::default(),
            enemies: EnemyTuning::default(),
            scores: ScoreTable::default(),
            level_complete_delay: 2.0,
        }
    }
}

impl SimConfig {
    /// Parse a (possibly partial) JSON document and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ConfigParse`] for malformed JSON and
    /// [`EngineError::InvalidConfig`] for out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(json).map_err(EngineError::ConfigParse)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value the simulation relies on being in range.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<(), EngineError> {
        fn positive(name: &str, value: f64) -> Result<(), EngineError> {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(EngineError::InvalidConfig(format!(
                    "{name} must be positive and finite, got {value}"
                )))
            }
        }
        fn non_negative(name: &str, value: f64) -> Result<(), EngineError> {
            if value >= 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(EngineError::InvalidConfig(format!(
                    "{name} must be non-negative and finite, got {value}"
                )))
            }
        }

        positive("clock.fixed_step", self.clock.fixed_step)?;
        positive("clock.max_step_clamp", self.clock.max_step_clamp)?;
        if self.clock.max_step_clamp < self.clock.fixed_step {
            return Err(EngineError::InvalidConfig(format!(
                "clock.max_step_clamp ({}) is shorter than one step ({})",
                self.clock.max_step_clamp, self.clock.fixed_step
            )));
        }

        non_negative("input.buffer_window", self.input.buffer_window)?;
        non_negative("physics.gravity", self.physics.gravity)?;
        non_negative("physics.coyote_window", self.physics.coyote_window)?;
        non_negative("physics.max_hold_duration", self.physics.max_hold_duration)?;
        positive("physics.max_fall_speed", self.physics.max_fall_speed)?;
        if !(0.0..=1.0).contains(&self.physics.jump_cut_factor) {
            return Err(EngineError::InvalidConfig(format!(
                "physics.jump_cut_factor must be within [0, 1], got {}",
                self.physics.jump_cut_factor
            )));
        }

        let player = &self.player;
        non_negative("player.walk_speed", player.walk_speed)?;
        non_negative("player.dash_speed", player.dash_speed)?;
        non_negative("player.dash_duration", player.dash_duration)?;
        non_negative("player.dash_cooldown", player.dash_cooldown)?;
        non_negative("player.invulnerability", player.invulnerability)?;
        non_negative("player.fireball_speed", player.fireball_speed)?;
        non_negative("player.fireball_cooldown", player.fireball_cooldown)?;
        non_negative("player.fireball_lifetime", player.fireball_lifetime)?;
        non_negative("player.fall_death_margin", player.fall_death_margin)?;
        if !(player.stomp_bounce <= 0.0 && player.stomp_bounce.is_finite()) {
            return Err(EngineError::InvalidConfig(format!(
                "player.stomp_bounce must be zero or negative (upward) and finite, got {}",
                player.stomp_bounce
            )));
        }
        if self.player.starting_lives == 0 {
            return Err(EngineError::InvalidConfig(
                "player.starting_lives must be at least 1".to_owned(),
            ));
        }
        non_negative("level_complete_delay", self.level_complete_delay)?;

        self.enemies.validate()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
