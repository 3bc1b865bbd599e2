//! Fixed-timestep clock with render interpolation.
//!
//! The host calls into the simulation at an irregular rate (display refresh,
//! browser animation frames, a test harness). The [`Clock`] turns each of
//! those calls into zero or more uniform simulation ticks:
//!
//! 1. The raw wall-clock delta is clamped to `max_step_clamp`. A stall
//!    (debugger pause, minimised window) therefore costs at most a bounded
//!    burst of catch-up ticks instead of a spiral of death. The clamp is a
//!    degradation (the game briefly runs in slow motion), never an error.
//! 2. The delta is added to the accumulator and whole `fixed_step` slices are
//!    drained from it, one tick each.
//! 3. The leftover fraction becomes the interpolation alpha the renderer uses
//!    to blend the previous and current snapshots.
//!
//! # Example
//!
//! ```
//! use tilestep_core::clock::{Clock, ClockConfig};
//!
//! let mut clock = Clock::new(ClockConfig::default());
//! let advance = clock.advance(0.04); // 2.4 ticks worth at 60 Hz
//! assert_eq!(advance.ticks, 2);
//! assert!(advance.alpha > 0.39 && advance.alpha < 0.41);
//! assert_eq!(advance.steps().count(), 2);
//! ```

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ClockConfig
// ---------------------------------------------------------------------------

/// Configuration for the fixed-step clock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Duration of one simulation tick in seconds. Must be positive and finite.
    pub fixed_step: f64,
    /// Largest raw delta accepted per host callback, in seconds.
    pub max_step_clamp: f64,
}

impl Default for ClockConfig {
    /// 60 Hz ticks, 250 ms clamp.
    fn default() -> Self {
        Self {
            fixed_step: 1.0 / 60.0,
            max_step_clamp: 0.25,
        }
    }
}

/// Unit of the timestamps handed to [`Clock::advance_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    Seconds,
    Milliseconds,
}

impl TimeUnit {
    /// Normalize a timestamp in this unit to seconds.
    pub fn to_seconds(self, value: f64) -> f64 {
        match self {
            TimeUnit::Seconds => value,
            TimeUnit::Milliseconds => value / 1000.0,
        }
    }
}

// ---------------------------------------------------------------------------
// ClockAdvance
// ---------------------------------------------------------------------------

/// Result of feeding one host callback into the clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockAdvance {
    /// Number of fixed ticks to execute, in order, before rendering.
    pub ticks: u32,
    /// The fixed step each tick represents.
    pub fixed_step: f64,
    /// Leftover fraction of a tick in `[0, 1)`, for render interpolation.
    pub alpha: f64,
    /// Whether the raw delta was clamped to `max_step_clamp`.
    pub clamped: bool,
}

impl ClockAdvance {
    /// Iterate the tick durations (each equal to `fixed_step`).
    pub fn steps(&self) -> impl Iterator<Item = f64> {
        std::iter::repeat(self.fixed_step).take(self.ticks as usize)
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Fixed-step accumulator.
///
/// Invariants: `accumulator >= 0` at all times and `accumulator < fixed_step`
/// after every [`advance`](Self::advance).
#[derive(Debug, Clone)]
pub struct Clock {
    accumulator: f64,
    fixed_step: f64,
    max_step_clamp: f64,
    /// Last host timestamp in seconds, `None` until the first callback.
    last_timestamp: Option<f64>,
    tick_counter: u64,
}

impl Clock {
    /// Create a clock from its configuration.
    ///
    /// # Panics
    ///
    /// Panics if `fixed_step` or `max_step_clamp` is not positive and finite.
    pub fn new(config: ClockConfig) -> Self {
        assert!(
            config.fixed_step > 0.0 && config.fixed_step.is_finite(),
            "fixed_step must be positive and finite, got {}",
            config.fixed_step
        );
        assert!(
            config.max_step_clamp > 0.0 && config.max_step_clamp.is_finite(),
            "max_step_clamp must be positive and finite, got {}",
            config.max_step_clamp
        );
        Self {
            accumulator: 0.0,
            fixed_step: config.fixed_step,
            max_step_clamp: config.max_step_clamp,
            last_timestamp: None,
            tick_counter: 0,
        }
    }

    /// Feed a raw wall-clock delta (seconds) and drain whole ticks.
    ///
    /// Negative, NaN and infinite deltas contribute nothing. Deltas above
    /// `max_step_clamp` are clamped, reported in [`ClockAdvance::clamped`]
    /// and logged at warn level. Clamping is never an error.
    pub fn advance(&mut self, raw_delta: f64) -> ClockAdvance {
        let mut delta = if raw_delta.is_finite() && raw_delta > 0.0 {
            raw_delta
        } else {
            0.0
        };

        let clamped = delta > self.max_step_clamp;
        if clamped {
            tracing::warn!(
                raw_delta,
                clamp = self.max_step_clamp,
                "frame delta clamped to bound catch-up ticks"
            );
            delta = self.max_step_clamp;
        }

        self.accumulator += delta;

        let mut ticks = 0u32;
        while self.accumulator >= self.fixed_step {
            self.accumulator -= self.fixed_step;
            ticks += 1;
        }
        self.tick_counter += u64::from(ticks);

        ClockAdvance {
            ticks,
            fixed_step: self.fixed_step,
            alpha: self.interpolation_alpha(),
            clamped,
        }
    }

    /// Feed an absolute host timestamp.
    ///
    /// The first call only primes the clock and yields no ticks. A timestamp
    /// earlier than the previous one is treated as a zero delta and becomes
    /// the new reference point.
    pub fn advance_to(&mut self, timestamp: f64, unit: TimeUnit) -> ClockAdvance {
        let now = unit.to_seconds(timestamp);
        let delta = match self.last_timestamp {
            None => 0.0,
            Some(last) if now < last => {
                tracing::warn!(
                    previous = last,
                    current = now,
                    "host timestamp went backwards, treating as zero delta"
                );
                0.0
            }
            Some(last) => now - last,
        };
        if now.is_finite() {
            self.last_timestamp = Some(now);
        }
        self.advance(delta)
    }

    /// Leftover fraction of a tick, in `[0, 1)`.
    pub fn interpolation_alpha(&self) -> f64 {
        self.accumulator / self.fixed_step
    }

    /// Upper bound on the ticks a single [`advance`](Self::advance) can emit.
    pub fn max_ticks_per_advance(&self) -> u32 {
        (self.max_step_clamp / self.fixed_step).ceil() as u32 + 1
    }

    /// The fixed step in seconds.
    pub fn fixed_step(&self) -> f64 {
        self.fixed_step
    }

    /// Time not yet consumed by a tick.
    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    /// Total ticks emitted since creation.
    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    /// Simulation time in seconds, computed as `tick_count * fixed_step` so it
    /// does not drift from repeated addition.
    pub fn sim_time(&self) -> f64 {
        self.tick_counter as f64 * self.fixed_step
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(ClockConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
