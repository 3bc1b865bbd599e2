//! The host-facing driver.
//!
//! A host owns one [`Simulation`] and calls [`Simulation::frame`] from its
//! periodic callback with a monotonically increasing timestamp. Each call
//! runs zero or more fixed ticks of the game-flow machine and returns a
//! [`RenderSnapshot`] for the renderer.
//!
//! Host requests (start, pause, confirm, ...) are latched as [`FlowSignals`]
//! and consumed by the next flow update. Saves produced during a tick are
//! written after the tick loop, so no tick ever performs I/O.

use tilestep_core::clock::{Clock, TimeUnit};
use tilestep_core::input::{ControlState, InputEvent};
use tilestep_core::state_machine::StateMachine;

use crate::config::SimConfig;
use crate::flow::{flow_machine, FlowSignals, FlowState, Session};
use crate::loader::LevelSource;
use crate::save::{load_save, write_save, SaveData, SaveStore};
use crate::snapshot::RenderSnapshot;
use crate::world::{TickReport, World};

pub struct Simulation {
    clock: Clock,
    flow: StateMachine<FlowState, Session>,
    session: Session,
    saves: Box<dyn SaveStore>,
}

impl Simulation {
    /// Create a simulation sitting in the main menu.
    ///
    /// The save store is read once here; the menu's continue option uses
    /// that record (or any save written later in this session).
    ///
    /// # Panics
    ///
    /// Panics if the clock configuration is invalid. Use
    /// [`SimConfig::validate`] first for configuration from untrusted input.
    pub fn new(config: SimConfig, levels: Box<dyn LevelSource>, saves: Box<dyn SaveStore>) -> Self {
        let clock = Clock::new(config.clock);
        let available_save = load_save(saves.as_ref());
        let mut session = Session::new(config, levels, available_save);
        let mut flow = flow_machine();
        flow.start(&mut session);
        tracing::info!(has_save = session.available_save.is_some(), "simulation created");
        Self {
            clock,
            flow,
            session,
            saves,
        }
    }

    /// Advance to the host timestamp and return what to draw.
    pub fn frame(&mut self, timestamp: f64, unit: TimeUnit) -> RenderSnapshot {
        let advance = self.clock.advance_to(timestamp, unit);
        self.session.now = unit.to_seconds(timestamp);
        self.session.reports.clear();

        for dt in advance.steps() {
            self.flow.update(&mut self.session, dt);
            self.session.signals = FlowSignals::default();
        }

        self.flush_save();
        self.snapshot(advance.alpha)
    }

    fn flush_save(&mut self) {
        let Some(save) = self.session.pending_save.take() else {
            return;
        };
        match write_save(self.saves.as_ref(), &save) {
            Ok(()) => tracing::info!(level = %save.level_id, score = save.score, "game saved"),
            Err(error) => tracing::warn!(%error, "could not write save"),
        }
        // Offer it even if storage failed; it is still valid for this session.
        self.session.available_save = Some(save);
    }

    fn snapshot(&self, alpha: f64) -> RenderSnapshot {
        let flow = self.flow.current();
        match &self.session.world {
            Some(world) => RenderSnapshot::capture(world, alpha, flow),
            None => RenderSnapshot::empty(
                alpha,
                flow,
                self.session.progress.lives,
                self.session.progress.score,
            ),
        }
    }

    // -- Host requests ------------------------------------------------------

    pub fn start_new_game(&mut self) {
        self.session.signals.start = true;
    }

    pub fn continue_game(&mut self) {
        self.session.signals.continue_game = true;
    }

    pub fn pause(&mut self) {
        self.session.signals.pause = true;
    }

    pub fn resume(&mut self) {
        self.session.signals.resume = true;
    }

    pub fn quit(&mut self) {
        self.session.signals.quit = true;
    }

    pub fn confirm(&mut self) {
        self.session.signals.confirm = true;
    }

    /// Forward a press to the world. Presses outside `Playing` are dropped.
    pub fn push_input(&mut self, event: InputEvent) {
        match (&mut self.session.world, self.flow.current()) {
            (Some(world), FlowState::Playing) => world.push_input(event),
            (_, state) => tracing::trace!(?event, ?state, "press dropped outside play"),
        }
    }

    /// Set the held controls applied to every following tick.
    pub fn set_controls(&mut self, controls: ControlState) {
        self.session.controls = controls;
    }

    // -- Accessors ----------------------------------------------------------

    pub fn flow_state(&self) -> FlowState {
        self.flow.current()
    }

    pub fn world(&self) -> Option<&World> {
        self.session.world.as_ref()
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn config(&self) -> &SimConfig {
        &self.session.config
    }

    /// The save the main menu would continue from.
    pub fn available_save(&self) -> Option<&SaveData> {
        self.session.available_save.as_ref()
    }

    /// Why the most recent level load failed.
    pub fn load_error(&self) -> Option<&str> {
        self.session.load_error.as_deref()
    }

    /// World ticks executed during the most recent [`frame`](Self::frame).
    pub fn last_frame_reports(&self) -> &[TickReport] {
        &self.session.reports
    }

    /// Replace the level source (takes effect on the next load).
    pub fn set_level_source(&mut self, levels: Box<dyn LevelSource>) {
        self.session.levels = levels;
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("flow", &self.flow.current())
            .field("clock", &self.clock)
            .field("session", &self.session)
            .finish()
    }
}
