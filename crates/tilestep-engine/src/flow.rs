//! Top-level game flow.
//!
//! ```text
//!            start / continue              level ready
//! MainMenu ---------------------> Loading ------------> Playing <--+
//!    ^                               |                  |  |  |   | resume
//!    |   load failed / quit          |                  |  |  +-> Paused
//!    +-------------------------------+                  |  |        |
//!    |                                                  |  |        | quit
//!    +--------------------------------------------------|--|--------+
//!    |        confirm                      lives == 0   |  | goal
//!    +-------------------- GameOver <-------------------+  v
//!    |                                              LevelComplete
//!    +---- last level ----------------------------------+  | next level
//!                                                          +-> Loading
//! ```
//!
//! Only `Playing` advances the world. `Paused` reads signals and nothing
//! else, so no entity can move while the game is paused.
//!
//! Level loading is asynchronous: `Loading` requests the level on entry and
//! polls the [`PendingLoad`] once per tick. Leaving `Loading` drops the load,
//! which cancels it.
//!
//! Reaching a checkpoint queues a save that resumes at that checkpoint.
//! Completing a level queues one that resumes at the start of the next level.
//! The host driver writes queued saves after the frame's ticks.

use serde::{Deserialize, Serialize};
use tilestep_core::collision::overlaps_solid;
use tilestep_core::geometry::{Aabb, Vec2};
use tilestep_core::input::ControlState;
use tilestep_core::state_machine::{StateHandlers, StateMachine};

use crate::config::SimConfig;
use crate::level::{Level, LevelDescriptor};
use crate::loader::{LevelSource, LoadPoll, PendingLoad};
use crate::player::SMALL_SIZE;
use crate::save::SaveData;
use crate::world::{Progress, TickReport, World, WorldEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowState {
    Loading,
    MainMenu,
    Playing,
    Paused,
    LevelComplete,
    GameOver,
}

/// Requests from the host, consumed by the next flow update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowSignals {
    /// Start a new game from the main menu.
    pub start: bool,
    /// Resume from the saved game, from the main menu.
    pub continue_game: bool,
    pub pause: bool,
    pub resume: bool,
    /// Abandon the current game (from `Paused` or `Loading`).
    pub quit: bool,
    /// Acknowledge a level-complete or game-over screen.
    pub confirm: bool,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Everything the flow hooks operate on.
pub struct Session {
    pub config: SimConfig,
    pub levels: Box<dyn LevelSource>,
    pub signals: FlowSignals,
    pub controls: ControlState,
    /// The level being played, kept through `Paused`, `LevelComplete` and
    /// `GameOver` so they can still be drawn.
    pub world: Option<World>,
    /// Progress carried into the next level.
    pub progress: Progress,
    /// Level the next `Loading` state requests.
    pub requested_level: Option<String>,
    pub pending: Option<PendingLoad<LevelDescriptor>>,
    /// Why the last load failed, if it did.
    pub load_error: Option<String>,
    /// Most recent save, offered by the main menu.
    pub available_save: Option<SaveData>,
    /// A save produced during a tick, written out by the host driver after
    /// the tick loop.
    pub pending_save: Option<SaveData>,
    /// Host time (seconds) of the current frame, stamped on saves.
    pub now: f64,
    /// Seconds spent on the level-complete screen.
    pub screen_timer: f64,
    /// Reports of the world ticks run during the current frame.
    pub reports: Vec<TickReport>,
}

impl Session {
    pub fn new(config: SimConfig, levels: Box<dyn LevelSource>, available_save: Option<SaveData>) -> Self {
        let lives = config.player.starting_lives;
        Self {
            config,
            levels,
            signals: FlowSignals::default(),
            controls: ControlState::default(),
            world: None,
            progress: Progress::new(lives),
            requested_level: None,
            pending: None,
            load_error: None,
            available_save,
            pending_save: None,
            now: 0.0,
            screen_timer: 0.0,
            reports: Vec::new(),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("signals", &self.signals)
            .field("world", &self.world)
            .field("progress", &self.progress)
            .field("requested_level", &self.requested_level)
            .field("loading", &self.pending.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

fn enter_menu(session: &mut Session) {
    session.world = None;
    session.pending = None;
}

fn menu(session: &mut Session, _dt: f64) -> Option<FlowState> {
    if session.signals.continue_game {
        if let Some(save) = session.available_save.clone() {
            tracing::info!(level = %save.level_id, lives = save.lives, "continuing saved game");
            session.progress = Progress {
                lives: save.lives,
                score: save.score,
                power: save.power,
                checkpoint: Some(save.checkpoint),
            };
            session.requested_level = Some(save.level_id);
            return Some(FlowState::Loading);
        }
        tracing::debug!("continue requested without a save");
    }
    if session.signals.start {
        session.progress = Progress::new(session.config.player.starting_lives);
        session.requested_level = Some(session.levels.first_level().to_owned());
        return Some(FlowState::Loading);
    }
    None
}

fn begin_load(session: &mut Session) {
    let id = session
        .requested_level
        .clone()
        .unwrap_or_else(|| session.levels.first_level().to_owned());
    tracing::debug!(level = %id, "requesting level");
    session.load_error = None;
    session.world = None;
    session.pending = Some(session.levels.request(&id));
}

fn poll_load(session: &mut Session, _dt: f64) -> Option<FlowState> {
    if session.signals.quit {
        return Some(FlowState::MainMenu);
    }
    let pending = session.pending.as_mut()?;
    let label = pending.label().to_owned();
    let result = match pending.poll() {
        LoadPoll::Pending => return None,
        LoadPoll::Ready(desc) => desc.build(),
        LoadPoll::Failed(error) => Err(error),
    };
    match result {
        Ok(level) => {
            if let Some(checkpoint) = session.progress.checkpoint {
                if !is_standing_point(&level, checkpoint) {
                    tracing::debug!(level = %level.id, "saved checkpoint unusable; starting at spawn");
                    session.progress.checkpoint = None;
                }
            }
            session.world = Some(World::new(level, session.config.clone(), session.progress.clone()));
            Some(FlowState::Playing)
        }
        Err(error) => {
            tracing::error!(level = %label, %error, "level load failed");
            session.load_error = Some(error.to_string());
            Some(FlowState::MainMenu)
        }
    }
}

fn end_load(session: &mut Session) {
    session.pending = None;
}

/// A respawn point is usable if it lies inside the level and a small player
/// standing there is not inside solid tiles.
fn is_standing_point(level: &Level, point: Vec2) -> bool {
    let grid = &level.grid;
    let inside = point.is_finite()
        && point.x >= 0.0
        && point.x <= grid.world_width()
        && point.y > 0.0
        && point.y <= grid.world_height();
    inside && !overlaps_solid(grid, &Aabb::from_feet(point, SMALL_SIZE.x, SMALL_SIZE.y))
}

fn play(session: &mut Session, _dt: f64) -> Option<FlowState> {
    if session.signals.pause {
        return Some(FlowState::Paused);
    }
    let world = session.world.as_mut()?;
    world.set_controls(session.controls);
    let report = world.tick();
    let reached = report
        .events
        .iter()
        .any(|event| matches!(event, WorldEvent::CheckpointReached { .. }));
    session.reports.push(report);
    if reached {
        if let Some(checkpoint) = world.progress().checkpoint {
            let level_id = world.level().id.clone();
            session.pending_save = Some(save_of(world.progress(), level_id, checkpoint, session.now));
        }
    }
    if world.is_game_over() {
        Some(FlowState::GameOver)
    } else if world.is_complete() {
        Some(FlowState::LevelComplete)
    } else {
        None
    }
}

fn paused(session: &mut Session, _dt: f64) -> Option<FlowState> {
    if session.signals.quit {
        Some(FlowState::MainMenu)
    } else if session.signals.resume {
        Some(FlowState::Playing)
    } else {
        None
    }
}

fn complete_level(session: &mut Session) {
    session.screen_timer = 0.0;
    let Some(world) = session.world.as_ref() else {
        return;
    };
    let level = world.level();
    session.progress = world.progress().clone();
    session.progress.checkpoint = None;

    let resume_on = level.next.clone().unwrap_or_else(|| level.id.clone());
    // The next level's spawn is unknown until it loads; the origin is never a
    // standing point, so continuing starts at the spawn.
    session.pending_save = Some(save_of(&session.progress, resume_on, Vec2::ZERO, session.now));
}

fn save_of(progress: &Progress, level_id: String, checkpoint: Vec2, now: f64) -> SaveData {
    SaveData::new(
        progress.lives,
        progress.score,
        progress.power,
        level_id,
        checkpoint,
        now,
    )
}

fn level_complete(session: &mut Session, dt: f64) -> Option<FlowState> {
    session.screen_timer += dt;
    if !session.signals.confirm && session.screen_timer < session.config.level_complete_delay {
        return None;
    }
    let next = session.world.as_ref().and_then(|w| w.level().next.clone());
    match next {
        Some(id) => {
            session.requested_level = Some(id);
            Some(FlowState::Loading)
        }
        None => {
            tracing::info!(score = session.progress.score, "final level complete");
            Some(FlowState::MainMenu)
        }
    }
}

fn game_over(session: &mut Session, _dt: f64) -> Option<FlowState> {
    session.signals.confirm.then_some(FlowState::MainMenu)
}

/// Build the flow machine. It starts in `MainMenu` once started.
pub fn flow_machine() -> StateMachine<FlowState, Session> {
    let mut machine = StateMachine::new("flow", FlowState::MainMenu);
    machine
        .register(
            FlowState::MainMenu,
            StateHandlers::new().on_enter(enter_menu).on_update(menu),
        )
        .register(
            FlowState::Loading,
            StateHandlers::new()
                .on_enter(begin_load)
                .on_exit(end_load)
                .on_update(poll_load),
        )
        .register(FlowState::Playing, StateHandlers::new().on_update(play))
        .register(FlowState::Paused, StateHandlers::new().on_update(paused))
        .register(
            FlowState::LevelComplete,
            StateHandlers::new()
                .on_enter(complete_level)
                .on_update(level_complete),
        )
        .register(FlowState::GameOver, StateHandlers::new().on_update(game_over));
    machine
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
