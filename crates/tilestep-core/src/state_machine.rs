//! Generic finite-state machine with enter / exit / update hooks.
//!
//! One abstraction serves every state-driven part of the simulation: the
//! player's power level, each enemy's behaviour, and the top-level game flow.
//! A machine is parameterised by its state identifier `S` (a small `Copy`
//! enum) and a context type `C` that the hooks mutate.
//!
//! Hooks are plain function pointers, registered once per state:
//!
//! - `enter(ctx)` runs when the state becomes active (including the initial
//!   state on [`StateMachine::start`]).
//! - `exit(ctx)` runs when the state is left, always before the next state's
//!   `enter`.
//! - `update(ctx, dt)` runs once per [`StateMachine::update`] call, only for the
//!   active state, and may request a transition by returning `Some(next)`.
//!
//! Transitioning to the active state is a no-op unless it is forced with
//! [`StateMachine::force_transition`]. Transitioning to a state that was never
//! registered is a programmer error and panics.
//!
//! ```
//! use tilestep_core::state_machine::{StateHandlers, StateMachine};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum Light { Red, Green }
//!
//! let mut machine: StateMachine<Light, f64> = StateMachine::new("light", Light::Red);
//! machine.register(Light::Red, StateHandlers::new().on_update(|t: &mut f64, dt| {
//!     *t += dt;
//!     (*t >= 1.0).then_some(Light::Green)
//! }));
//! machine.register(Light::Green, StateHandlers::new());
//!
//! let mut elapsed = 0.0;
//! machine.start(&mut elapsed);
//! machine.update(&mut elapsed, 0.5);
//! assert_eq!(machine.current(), Light::Red);
//! machine.update(&mut elapsed, 0.5);
//! assert_eq!(machine.current(), Light::Green);
//! ```

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Hook run on entering or leaving a state.
pub type HookFn<C> = fn(&mut C);

/// Per-tick hook of the active state. Returning `Some(next)` requests a
/// transition once the hook has returned.
pub type UpdateFn<S, C> = fn(&mut C, f64) -> Option<S>;

/// The hooks of one state. Any of them may be absent.
pub struct StateHandlers<S, C> {
    pub enter: Option<HookFn<C>>,
    pub exit: Option<HookFn<C>>,
    pub update: Option<UpdateFn<S, C>>,
}

impl<S, C> StateHandlers<S, C> {
    /// A state with no hooks.
    pub fn new() -> Self {
        Self {
            enter: None,
            exit: None,
            update: None,
        }
    }

    pub fn on_enter(mut self, hook: HookFn<C>) -> Self {
        self.enter = Some(hook);
        self
    }

    pub fn on_exit(mut self, hook: HookFn<C>) -> Self {
        self.exit = Some(hook);
        self
    }

    pub fn on_update(mut self, hook: UpdateFn<S, C>) -> Self {
        self.update = Some(hook);
        self
    }
}

impl<S, C> Default for StateHandlers<S, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, C> Clone for StateHandlers<S, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S, C> Copy for StateHandlers<S, C> {}

impl<S, C> Debug for StateHandlers<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateHandlers")
            .field("enter", &self.enter.is_some())
            .field("exit", &self.exit.is_some())
            .field("update", &self.update.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TransitionOutcome
// ---------------------------------------------------------------------------

/// What a transition request (or an update) did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome<S> {
    /// The machine stayed where it was.
    Stayed,
    /// `from` was exited and `to` entered. `from == to` only for a forced
    /// re-enter.
    Changed { from: S, to: S },
}

impl<S> TransitionOutcome<S> {
    pub fn changed(&self) -> bool {
        matches!(self, TransitionOutcome::Changed { .. })
    }
}

// ---------------------------------------------------------------------------
// StateMachine
// ---------------------------------------------------------------------------

/// A registry of states with exactly one active at a time.
pub struct StateMachine<S, C> {
    name: &'static str,
    states: HashMap<S, StateHandlers<S, C>>,
    current: S,
    previous: Option<S>,
    started: bool,
    time_in_state: f64,
    enter_count: u64,
    exit_count: u64,
}

impl<S, C> StateMachine<S, C>
where
    S: Copy + Eq + Hash + Debug,
{
    /// Create a machine that will start in `initial`. `name` only labels log
    /// output.
    pub fn new(name: &'static str, initial: S) -> Self {
        Self {
            name,
            states: HashMap::new(),
            current: initial,
            previous: None,
            started: false,
            time_in_state: 0.0,
            enter_count: 0,
            exit_count: 0,
        }
    }

    /// Register the hooks of `state`.
    ///
    /// # Panics
    ///
    /// Panics if `state` is already registered.
    pub fn register(&mut self, state: S, handlers: StateHandlers<S, C>) -> &mut Self {
        if self.states.insert(state, handlers).is_some() {
            self.fail(format_args!("state {state:?} registered twice"));
        }
        self
    }

    pub fn is_registered(&self, state: S) -> bool {
        self.states.contains_key(&state)
    }

    /// Enter the initial state. Calling it again does nothing.
    ///
    /// # Panics
    ///
    /// Panics if the initial state was never registered.
    pub fn start(&mut self, ctx: &mut C) {
        if self.started {
            return;
        }
        let initial = self.current;
        let handlers = self.handlers(initial);
        self.started = true;
        self.time_in_state = 0.0;
        self.enter_count += 1;
        tracing::debug!(machine = self.name, state = ?initial, "state machine started");
        if let Some(enter) = handlers.enter {
            enter(ctx);
        }
    }

    /// Move to `to`, exiting the current state first. A request for the
    /// active state is ignored.
    ///
    /// # Panics
    ///
    /// Panics if `to` is not registered or the machine was not started.
    pub fn transition(&mut self, to: S, ctx: &mut C) -> TransitionOutcome<S> {
        // An unregistered target fails even when it equals the current state.
        self.handlers(to);
        if to == self.current {
            return TransitionOutcome::Stayed;
        }
        self.switch(to, ctx)
    }

    /// Move to `to` even if it is already active, running `exit` and `enter`.
    ///
    /// # Panics
    ///
    /// Same conditions as [`transition`](Self::transition).
    pub fn force_transition(&mut self, to: S, ctx: &mut C) -> TransitionOutcome<S> {
        self.switch(to, ctx)
    }

    /// Run the active state's `update` hook, then apply the transition it
    /// requested, if any.
    pub fn update(&mut self, ctx: &mut C, dt: f64) -> TransitionOutcome<S> {
        self.ensure_started();
        self.time_in_state += dt;
        let handlers = self.handlers(self.current);
        match handlers.update.and_then(|update| update(ctx, dt)) {
            Some(next) => self.transition(next, ctx),
            None => TransitionOutcome::Stayed,
        }
    }

    pub fn current(&self) -> S {
        self.current
    }

    /// The state active before the most recent transition.
    pub fn previous(&self) -> Option<S> {
        self.previous
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Seconds of `update` time accumulated since the active state was entered.
    pub fn time_in_state(&self) -> f64 {
        self.time_in_state
    }

    /// Number of `enter` events, the initial one included.
    pub fn enter_count(&self) -> u64 {
        self.enter_count
    }

    pub fn exit_count(&self) -> u64 {
        self.exit_count
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn switch(&mut self, to: S, ctx: &mut C) -> TransitionOutcome<S> {
        self.ensure_started();
        let from = self.current;
        let outgoing = self.handlers(from);
        let incoming = self.handlers(to);

        if let Some(exit) = outgoing.exit {
            exit(ctx);
        }
        self.exit_count += 1;

        self.previous = Some(from);
        self.current = to;
        self.time_in_state = 0.0;

        if let Some(enter) = incoming.enter {
            enter(ctx);
        }
        self.enter_count += 1;

        tracing::debug!(machine = self.name, ?from, ?to, "state transition");
        TransitionOutcome::Changed { from, to }
    }

    fn handlers(&self, state: S) -> StateHandlers<S, C> {
        match self.states.get(&state) {
            Some(handlers) => *handlers,
            None => self.fail(format_args!("transition to unregistered state {state:?}")),
        }
    }

    fn ensure_started(&self) {
        if !self.started {
            self.fail(format_args!("used before start()"));
        }
    }

    fn fail(&self, reason: std::fmt::Arguments<'_>) -> ! {
        tracing::error!(machine = self.name, %reason, "state machine misuse");
        panic!("state machine '{}': {}", self.name, reason);
    }
}

impl<S: Debug, C> Debug for StateMachine<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("name", &self.name)
            .field("current", &self.current)
            .field("previous", &self.previous)
            .field("states", &self.states.len())
            .field("time_in_state", &self.time_in_state)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Door {
        Closed,
        Open,
        Locked,
    }

    #[derive(Default)]
    struct Log {
        events: Vec<&'static str>,
        open_requested: bool,
        updates: u32,
    }

    fn door() -> StateMachine<Door, Log> {
        let mut machine = StateMachine::new("door", Door::Closed);
        machine
            .register(
                Door::Closed,
                StateHandlers::new()
                    .on_enter(|log: &mut Log| log.events.push("enter closed"))
                    .on_exit(|log: &mut Log| log.events.push("exit closed"))
                    .on_update(|log: &mut Log, _| {
                        log.updates += 1;
                        log.open_requested.then_some(Door::Open)
                    }),
            )
            .register(
                Door::Open,
                StateHandlers::new()
                    .on_enter(|log: &mut Log| log.events.push("enter open"))
                    .on_exit(|log: &mut Log| log.events.push("exit open")),
            );
        machine
    }

    #[test]
    fn start_enters_initial_state() {
        let mut log = Log::default();
        let mut machine = door();
        machine.start(&mut log);
        machine.start(&mut log);
        assert_eq!(log.events, ["enter closed"]);
        assert_eq!(machine.enter_count(), 1);
    }

    #[test]
    fn exit_runs_before_enter() {
        let mut log = Log::default();
        let mut machine = door();
        machine.start(&mut log);
        let outcome = machine.transition(Door::Open, &mut log);
        assert_eq!(
            outcome,
            TransitionOutcome::Changed {
                from: Door::Closed,
                to: Door::Open
            }
        );
        assert_eq!(log.events, ["enter closed", "exit closed", "enter open"]);
        assert_eq!(machine.previous(), Some(Door::Closed));
    }

    #[test]
    fn self_transition_is_noop_unless_forced() {
        let mut log = Log::default();
        let mut machine = door();
        machine.start(&mut log);
        assert_eq!(machine.transition(Door::Closed, &mut log), TransitionOutcome::Stayed);
        assert_eq!(log.events.len(), 1);

        assert!(machine.force_transition(Door::Closed, &mut log).changed());
        assert_eq!(log.events, ["enter closed", "exit closed", "enter closed"]);
    }

    #[test]
    fn update_only_runs_active_state_and_applies_request() {
        let mut log = Log::default();
        let mut machine = door();
        machine.start(&mut log);
        machine.update(&mut log, 0.1);
        assert_eq!(log.updates, 1);
        assert_eq!(machine.current(), Door::Closed);
        assert!((machine.time_in_state() - 0.1).abs() < 1e-12);

        log.open_requested = true;
        assert!(machine.update(&mut log, 0.1).changed());
        assert_eq!(machine.current(), Door::Open);
        assert_eq!(machine.time_in_state(), 0.0);

        // Open has no update hook: the Closed counter must not move.
        machine.update(&mut log, 0.1);
        assert_eq!(log.updates, 2);
    }

    #[test]
    fn enter_and_exit_counts_alternate() {
        let mut log = Log::default();
        let mut machine = door();
        machine.start(&mut log);
        for i in 0..10 {
            let to = if i % 2 == 0 { Door::Open } else { Door::Closed };
            machine.transition(to, &mut log);
            assert_eq!(machine.enter_count(), machine.exit_count() + 1);
        }
    }

    #[test]
    #[should_panic(expected = "unregistered state Locked")]
    fn unknown_target_panics() {
        let mut log = Log::default();
        let mut machine = door();
        machine.start(&mut log);
        machine.transition(Door::Locked, &mut log);
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_registration_panics() {
        let mut machine = door();
        machine.register(Door::Open, StateHandlers::new());
    }

    #[test]
    #[should_panic(expected = "before start")]
    fn update_before_start_panics() {
        let mut log = Log::default();
        let mut machine = door();
        machine.update(&mut log, 0.1);
    }
}
