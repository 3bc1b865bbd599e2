//! Deterministic replay with input recording and checkpoint verification.
//!
//! A [`ReplayLog`] holds everything needed to rebuild a run of one level:
//! the level descriptor, the configuration, the starting progress, and the
//! per-tick inputs (held controls and drained presses), plus periodic state
//! hash checkpoints. [`replay`] rebuilds a fresh [`World`] from the log,
//! feeds the recorded inputs tick by tick and compares hashes at each
//! checkpoint.
//!
//! # Recording
//!
//! ```
//! use tilestep_engine::prelude::*;
//!
//! let desc = LevelDescriptor::new("r", &["......", "......", "######"], Vec2::new(24.0, 32.0));
//! let config = SimConfig::default();
//! let progress = Progress::new(3);
//! let mut world = World::new(desc.build().unwrap(), config.clone(), progress.clone());
//! let mut recorder = ReplayRecorder::new(desc, config, progress, 10);
//!
//! world.set_controls(ControlState { move_x: 1.0, jump_held: false });
//! for _ in 0..60 {
//!     let hash = world.state_hash();
//!     let report = world.tick();
//!     recorder.record_tick(report.tick, report.controls, &report.presses, Some(hash));
//! }
//!
//! let log = recorder.finish();
//! let result = replay(&log).unwrap();
//! assert!(result.completed);
//! assert!(result.first_divergence.is_none());
//! assert_eq!(result.final_hash, world.state_hash());
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tilestep_core::input::{Action, ControlState, InputEvent};

use crate::config::SimConfig;
use crate::level::LevelDescriptor;
use crate::world::{Progress, World};

// ---------------------------------------------------------------------------
// ReplayLog
// ---------------------------------------------------------------------------

/// A complete replay log. Fully serializable to JSON for storage or
/// regression fixtures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayLog {
    pub level: LevelDescriptor,
    pub config: SimConfig,
    /// Progress the world was created with.
    pub progress: Progress,
    /// Replay executes exactly this many ticks, whatever the entries say.
    pub total_ticks: u64,
    pub entries: Vec<ReplayEntry>,
}

// ---------------------------------------------------------------------------
// ReplayEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplayEntry {
    /// Input observed by a tick. Only recorded when the controls changed or
    /// presses arrived; controls carry over to later ticks.
    Input {
        tick: u64,
        controls: ControlState,
        presses: Vec<Action>,
    },
    /// State hash taken before the tick ran.
    Checkpoint { tick: u64, state_hash: String },
}

// ---------------------------------------------------------------------------
// ReplayResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayResult {
    /// Whether every tick ran without a divergence.
    pub completed: bool,
    pub ticks_replayed: u64,
    /// The first checkpoint whose hash did not match.
    pub first_divergence: Option<ReplayDivergence>,
    /// Hash of the replayed world when the replay stopped.
    pub final_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayDivergence {
    pub tick: u64,
    pub expected_hash: String,
    pub actual_hash: String,
}

// ---------------------------------------------------------------------------
// ReplayRecorder
// ---------------------------------------------------------------------------

/// Records a run of one [`World`] into a [`ReplayLog`].
///
/// Call [`record_tick`](Self::record_tick) once per tick with what the tick's
/// [`TickReport`](crate::world::TickReport) says it consumed and the hash
/// taken *before* the tick ran.
pub struct ReplayRecorder {
    log: ReplayLog,
    checkpoint_interval: u64,
    ticks_recorded: u64,
    last_tick: Option<u64>,
    last_controls: ControlState,
}

impl ReplayRecorder {
    /// Create a recorder for a world built from `level`, `config` and
    /// `progress`.
    ///
    /// `checkpoint_interval` of 10 checkpoints ticks 0, 10, 20, ... An
    /// interval of 0 checkpoints every tick that supplies a hash.
    pub fn new(
        level: LevelDescriptor,
        config: SimConfig,
        progress: Progress,
        checkpoint_interval: u64,
    ) -> Self {
        Self {
            log: ReplayLog {
                level,
                config,
                progress,
                total_ticks: 0,
                entries: Vec::new(),
            },
            checkpoint_interval,
            ticks_recorded: 0,
            last_tick: None,
            last_controls: ControlState::default(),
        }
    }

    /// Record a single tick.
    ///
    /// # Panics
    ///
    /// Panics if `tick` is not strictly greater than the previously recorded
    /// tick.
    pub fn record_tick(
        &mut self,
        tick: u64,
        controls: ControlState,
        presses: &[Action],
        state_hash: Option<String>,
    ) {
        if let Some(prev) = self.last_tick {
            assert!(
                tick > prev,
                "ReplayRecorder::record_tick: tick {tick} is not after previous tick {prev}"
            );
        }
        self.last_tick = Some(tick);
        self.ticks_recorded += 1;

        if let Some(hash) = state_hash {
            if self.checkpoint_interval == 0 || tick % self.checkpoint_interval == 0 {
                self.log.entries.push(ReplayEntry::Checkpoint {
                    tick,
                    state_hash: hash,
                });
            }
        }

        if controls != self.last_controls || !presses.is_empty() {
            self.last_controls = controls;
            self.log.entries.push(ReplayEntry::Input {
                tick,
                controls,
                presses: presses.to_vec(),
            });
        }
    }

    pub fn finish(mut self) -> ReplayLog {
        self.log.total_ticks = self.ticks_recorded;
        self.log
    }
}

// ---------------------------------------------------------------------------
// replay()
// ---------------------------------------------------------------------------

/// Replay `log` on a fresh world and verify every checkpoint.
///
/// Stops at the first divergence and reports it; that is a successful call
/// with `completed == false`.
///
/// # Errors
///
/// Returns an error if the log is malformed (duplicate entries for a tick)
/// or its level or configuration is invalid.
pub fn replay(log: &ReplayLog) -> Result<ReplayResult, anyhow::Error> {
    let mut input_map: BTreeMap<u64, (ControlState, &[Action])> = BTreeMap::new();
    let mut checkpoint_map: BTreeMap<u64, &str> = BTreeMap::new();

    for entry in &log.entries {
        match entry {
            ReplayEntry::Input {
                tick,
                controls,
                presses,
            } => {
                if input_map.insert(*tick, (*controls, presses.as_slice())).is_some() {
                    return Err(anyhow::anyhow!(
                        "replay log contains duplicate Input entry at tick {tick}"
                    ));
                }
            }
            ReplayEntry::Checkpoint { tick, state_hash } => {
                if checkpoint_map.insert(*tick, state_hash.as_str()).is_some() {
                    return Err(anyhow::anyhow!(
                        "replay log contains duplicate Checkpoint entry at tick {tick}"
                    ));
                }
            }
        }
    }

    log.config
        .validate()
        .map_err(|e| anyhow::anyhow!("replay log carries an invalid configuration: {e}"))?;
    let level = log
        .level
        .build()
        .map_err(|e| anyhow::anyhow!("replay log carries an invalid level: {e}"))?;
    let mut world = World::new(level, log.config.clone(), log.progress.clone());

    let mut ticks_replayed: u64 = 0;
    let mut controls = ControlState::default();

    for tick in 0..log.total_ticks {
        if let Some((recorded, presses)) = input_map.get(&tick) {
            controls = *recorded;
            for &action in presses.iter() {
                world.push_input(InputEvent {
                    action,
                    timestamp: world.sim_time(),
                });
            }
        }
        world.set_controls(controls);

        if let Some(&expected) = checkpoint_map.get(&tick) {
            let actual = world.state_hash();
            if actual != expected {
                tracing::warn!(tick, expected, actual = %actual, "replay diverged");
                return Ok(ReplayResult {
                    completed: false,
                    ticks_replayed,
                    first_divergence: Some(ReplayDivergence {
                        tick,
                        expected_hash: expected.to_owned(),
                        actual_hash: actual.clone(),
                    }),
                    final_hash: actual,
                });
            }
        }

        world.tick();
        ticks_replayed += 1;
    }

    Ok(ReplayResult {
        completed: true,
        ticks_replayed,
        first_divergence: None,
        final_hash: world.state_hash(),
    })
}
