//! Per-entity velocity state and the semi-implicit Euler integrator.
//!
//! Each tick a [`PhysicsBody`] goes through the same steps:
//!
//! 1. Behavior code sets the horizontal velocity directly from the movement
//!    intent (walking is velocity-driven, not force-accumulated).
//! 2. [`PhysicsBody::start_jump`] / [`PhysicsBody::apply_jump_hold`] shape the
//!    vertical velocity for variable-height jumps.
//! 3. [`PhysicsBody::integrate`] applies gravity to the velocity *first* and
//!    only then derives the position delta from the updated velocity
//!    (symplectic Euler).
//! 4. The collision resolver corrects the motion, and
//!    [`PhysicsBody::apply_contacts`] commits ground contact and the coyote
//!    timer.
//!
//! Gravity is applied on grounded ticks as well. The resolver cancels it on
//! contact, which is what keeps the ground re-detected every tick.

use serde::{Deserialize, Serialize};

use crate::collision::Contacts;
use crate::geometry::Vec2;

// ---------------------------------------------------------------------------
// PhysicsConfig
// ---------------------------------------------------------------------------

/// Tuning constants shared by every body. Units are world units and seconds.
///
/// The jump-cut factor and the coyote window are tuning defaults, not
/// invariants; levels and games are expected to override them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Downward acceleration.
    pub gravity: f64,
    /// Vertical velocity set by a jump (negative is up).
    pub jump_impulse: f64,
    /// Extra vertical acceleration while the jump button is held (negative is up).
    pub jump_hold_acceleration: f64,
    /// How long holding the button keeps adding `jump_hold_acceleration`.
    pub max_hold_duration: f64,
    /// Factor applied to an upward velocity when the button is released early.
    pub jump_cut_factor: f64,
    /// Grace period after leaving the ground during which a jump is allowed.
    pub coyote_window: f64,
    /// Terminal falling speed.
    pub max_fall_speed: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: 980.0,
            jump_impulse: -420.0,
            jump_hold_acceleration: -600.0,
            max_hold_duration: 0.18,
            jump_cut_factor: 0.5,
            coyote_window: 0.1,
            max_fall_speed: 900.0,
        }
    }
}

// ---------------------------------------------------------------------------
// PhysicsBody
// ---------------------------------------------------------------------------

/// Velocity, ground contact and jump bookkeeping for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsBody {
    pub velocity_x: f64,
    pub velocity_y: f64,
    /// Multiplier on gravity (0 while dashing, for example).
    pub gravity_scale: f64,
    pub on_ground: bool,
    /// Seconds since the body last touched the ground; 0 while grounded.
    pub grounded_grace_timer: f64,
    /// Seconds the current jump has been held.
    jump_hold_timer: f64,
    /// Whether a jump is still rising and can be extended or cut.
    jump_active: bool,
}

impl Default for PhysicsBody {
    fn default() -> Self {
        Self {
            velocity_x: 0.0,
            velocity_y: 0.0,
            gravity_scale: 1.0,
            on_ground: false,
            grounded_grace_timer: 0.0,
            jump_hold_timer: 0.0,
            jump_active: false,
        }
    }
}

impl PhysicsBody {
    /// A body at rest on the ground.
    pub fn grounded() -> Self {
        Self {
            on_ground: true,
            ..Self::default()
        }
    }

    pub fn velocity(&self) -> Vec2 {
        Vec2::new(self.velocity_x, self.velocity_y)
    }

    pub fn set_velocity(&mut self, velocity: Vec2) {
        self.velocity_x = velocity.x;
        self.velocity_y = velocity.y;
    }

    /// Set the horizontal velocity from the resolved movement intent.
    pub fn set_horizontal(&mut self, velocity_x: f64) {
        self.velocity_x = velocity_x;
    }

    /// Whether a jump is allowed right now: grounded, or airborne for less
    /// than the coyote window.
    pub fn can_jump(&self, config: &PhysicsConfig) -> bool {
        self.on_ground || self.grounded_grace_timer < config.coyote_window
    }

    /// Whether a jump is rising and still reacts to the button.
    pub fn is_jumping(&self) -> bool {
        self.jump_active
    }

    /// Launch a jump. The coyote window is spent so the same ledge cannot be
    /// jumped from twice.
    pub fn start_jump(&mut self, config: &PhysicsConfig) {
        self.launch(config.jump_impulse);
        self.grounded_grace_timer = config.coyote_window;
    }

    /// Launch upward with an arbitrary impulse (stomp bounces, springs).
    pub fn launch(&mut self, impulse: f64) {
        self.velocity_y = impulse;
        self.jump_active = true;
        self.jump_hold_timer = 0.0;
        self.on_ground = false;
    }

    /// Shape the current jump from the button state.
    ///
    /// While held, for at most `max_hold_duration`, and only while still
    /// rising, `jump_hold_acceleration` is added. Releasing the button while
    /// rising multiplies the vertical velocity by `jump_cut_factor` once.
    pub fn apply_jump_hold(&mut self, held: bool, dt: f64, config: &PhysicsConfig) {
        if !self.jump_active {
            return;
        }
        if self.velocity_y >= 0.0 {
            self.jump_active = false;
            return;
        }
        if held {
            if self.jump_hold_timer < config.max_hold_duration {
                self.velocity_y += config.jump_hold_acceleration * dt;
            }
            self.jump_hold_timer += dt;
        } else {
            self.velocity_y *= config.jump_cut_factor;
            self.jump_active = false;
        }
    }

    /// Advance the velocity by one step and return the pending position delta.
    ///
    /// Semi-implicit Euler: `v += a * dt` first, then `delta = v * dt` with the
    /// updated velocity.
    pub fn integrate(&mut self, dt: f64, config: &PhysicsConfig) -> Vec2 {
        self.velocity_y += config.gravity * self.gravity_scale * dt;
        if self.velocity_y > config.max_fall_speed {
            self.velocity_y = config.max_fall_speed;
        }
        Vec2::new(self.velocity_x * dt, self.velocity_y * dt)
    }

    /// Commit the contacts reported by the collision resolver.
    ///
    /// A bottom contact grounds the body and resets the coyote timer;
    /// otherwise the body is airborne and the timer advances by `dt`. A top
    /// contact ends any rising jump.
    pub fn apply_contacts(&mut self, contacts: Contacts, dt: f64) {
        if contacts.bottom {
            self.on_ground = true;
            self.grounded_grace_timer = 0.0;
            self.jump_active = false;
        } else {
            self.on_ground = false;
            self.grounded_grace_timer += dt;
        }
        if contacts.top {
            self.jump_active = false;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
