//! Buffered input with bounded consumption windows.
//!
//! Discrete presses (jump, attack, dash) are remembered for a short window so
//! a press that arrives a few frames before its precondition holds (the
//! player lands just after pressing jump) is still honored.
//!
//! Two pieces cooperate:
//!
//! - [`InputQueue`] is the producer side. The input-collection collaborator
//!   pushes [`InputEvent`]s into it at any time.
//! - [`InputBuffer`] is the consumer side. At the start of each tick the
//!   simulation drains the queue into the buffer, so everything pushed before
//!   the tick began is visible to that tick, and everything pushed while it
//!   runs waits for the next one.
//!
//! The buffer keeps only the most recent press per action. Pressing jump
//! twice before it is consumed yields one buffered jump stamped with the
//! second press: the most recent intent wins.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// Logical actions that can be buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Action {
    Jump,
    Attack,
    Dash,
}

impl Action {
    /// Every action, in declaration order.
    pub const ALL: [Action; 3] = [Action::Jump, Action::Attack, Action::Dash];
}

// ---------------------------------------------------------------------------
// InputConfig
// ---------------------------------------------------------------------------

/// Tuning for the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// How long (seconds) a press stays consumable.
    pub buffer_window: f64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            buffer_window: 0.15,
        }
    }
}

// ---------------------------------------------------------------------------
// InputBuffer
// ---------------------------------------------------------------------------

/// Most-recent-press timestamps per [`Action`], in simulation seconds.
///
/// An entry whose age is `>= buffer_window` is expired: it can never be
/// consumed and is removed by the next [`sweep`](Self::sweep).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputBuffer {
    buffer_window: f64,
    /// `BTreeMap` so serialization (and therefore state hashing) is ordered.
    entries: BTreeMap<Action, f64>,
}

impl InputBuffer {
    /// Create an empty buffer with the given window in seconds.
    pub fn new(buffer_window: f64) -> Self {
        Self {
            buffer_window: buffer_window.max(0.0),
            entries: BTreeMap::new(),
        }
    }

    /// Create an empty buffer from its configuration.
    pub fn from_config(config: &InputConfig) -> Self {
        Self::new(config.buffer_window)
    }

    /// Record a press of `action` at `at_time`, replacing any earlier press.
    pub fn record(&mut self, action: Action, at_time: f64) {
        if let Some(previous) = self.entries.insert(action, at_time) {
            tracing::trace!(?action, previous, at_time, "buffered press replaced");
        }
    }

    /// Consume a buffered press of `action` if it is still inside the window.
    ///
    /// Returns `true` and removes the entry iff `at_time - stored < window`.
    /// An expired entry is left in place and reported as `false`; the
    /// per-tick [`sweep`](Self::sweep) removes it. After a successful consume
    /// every further attempt returns `false` until the action is recorded
    /// again.
    pub fn try_consume(&mut self, action: Action, at_time: f64) -> bool {
        match self.entries.get(&action) {
            Some(&stored) if at_time - stored < self.buffer_window => {
                self.entries.remove(&action);
                true
            }
            _ => false,
        }
    }

    /// Whether `action` has a consumable press at `at_time`, without consuming it.
    pub fn is_buffered(&self, action: Action, at_time: f64) -> bool {
        self.entries
            .get(&action)
            .is_some_and(|&stored| at_time - stored < self.buffer_window)
    }

    /// Remove every entry that is expired at `at_time`.
    pub fn sweep(&mut self, at_time: f64) {
        let window = self.buffer_window;
        self.entries.retain(|_, stored| at_time - *stored < window);
    }

    /// Drop every buffered press (used on respawn and state changes).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries currently stored, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The configured window in seconds.
    pub fn buffer_window(&self) -> f64 {
        self.buffer_window
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::from_config(&InputConfig::default())
    }
}

// ---------------------------------------------------------------------------
// InputEvent / InputQueue
// ---------------------------------------------------------------------------

/// A discrete press pushed by the input-collection collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    pub action: Action,
    /// Host timestamp of the press, in seconds. Informational: the buffer
    /// stamps presses with the simulation time of the tick that observes them.
    pub timestamp: f64,
}

/// Producer-side queue of presses waiting for the next tick.
#[derive(Debug, Clone, Default)]
pub struct InputQueue {
    pending: Vec<InputEvent>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a press. It becomes visible at the start of the next tick.
    pub fn push(&mut self, event: InputEvent) {
        self.pending.push(event);
    }

    /// Move every pending press into `buffer`, stamped with `now`.
    ///
    /// Returns the drained events in arrival order (for replay recording).
    pub fn drain_into(&mut self, buffer: &mut InputBuffer, now: f64) -> Vec<InputEvent> {
        let drained = std::mem::take(&mut self.pending);
        for event in &drained {
            buffer.record(event.action, now);
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ControlState
// ---------------------------------------------------------------------------

/// Held (non-buffered) controls, sampled once per tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    /// Horizontal movement intent in `[-1, 1]`.
    pub move_x: f64,
    /// Whether the jump button is currently held (variable jump height).
    pub jump_held: bool,
}

impl ControlState {
    /// `move_x` clamped to `[-1, 1]`, with non-finite values treated as 0.
    pub fn axis(&self) -> f64 {
        if self.move_x.is_finite() {
            self.move_x.clamp(-1.0, 1.0)
        } else {
            0.0
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
