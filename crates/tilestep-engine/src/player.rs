//! The player: movement intents, power level and damage handling.
//!
//! The power level is a [`StateMachine`] over [`PowerState`]. Its enter hooks
//! pick the hitbox size for the level, and its shared update hook counts down
//! invulnerability. Shrinking applies at once. Growing extends the box upward
//! from the feet and waits until [`Player::fit_hitbox`] finds room for it, so
//! powering up under a low ceiling never puts the player inside a wall.
//!
//! Power changes come from two directions:
//!
//! - pickups upgrade (`Mushroom`: Small to Big, `FireFlower`: anything to Fire),
//! - damage downgrades one level (Fire to Big, Big to Small) and starts an
//!   invulnerability window during which further damage is ignored. Damage
//!   while Small is fatal.

use serde::{Deserialize, Serialize};
use tilestep_core::collision::overlaps_solid;
use tilestep_core::geometry::{Aabb, Vec2};
use tilestep_core::input::Action;
use tilestep_core::physics::PhysicsBody;
use tilestep_core::state_machine::{StateHandlers, StateMachine};
use tilestep_core::tile::TileQuery;

use crate::config::PlayerConfig;
use crate::level::PickupKind;
use crate::world::SimulationContext;

pub const SMALL_SIZE: Vec2 = Vec2::new(12.0, 16.0);
pub const BIG_SIZE: Vec2 = Vec2::new(12.0, 28.0);

// ---------------------------------------------------------------------------
// PowerState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerState {
    Small,
    Big,
    Fire,
}

impl PowerState {
    /// The level below this one, or `None` from `Small`.
    pub fn downgraded(self) -> Option<PowerState> {
        match self {
            PowerState::Fire => Some(PowerState::Big),
            PowerState::Big => Some(PowerState::Small),
            PowerState::Small => None,
        }
    }
}

/// Result of a damage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DamageOutcome {
    /// The player was invulnerable.
    Ignored,
    /// The player lost a power level and is now invulnerable.
    Downgraded(PowerState),
    /// The player was Small.
    Died,
}

// ---------------------------------------------------------------------------
// Avatar
// ---------------------------------------------------------------------------

/// Everything about the player the power hooks and the world read and write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Avatar {
    /// Feet-centre origin.
    pub position: Vec2,
    pub previous_position: Vec2,
    pub body: PhysicsBody,
    /// Hitbox width and height.
    pub size: Vec2,
    /// Hitbox of the current power level; `size` catches up when there is room.
    pub full_size: Vec2,
    /// +1 facing right, -1 facing left.
    pub facing: f64,
    pub invulnerable_for: f64,
    pub dash_remaining: f64,
    pub dash_cooldown: f64,
    pub fire_cooldown: f64,
}

impl Avatar {
    pub fn aabb(&self) -> Aabb {
        Aabb::from_feet(self.position, self.size.x, self.size.y)
    }

    pub fn is_invulnerable(&self) -> bool {
        self.invulnerable_for > 0.0
    }

    pub fn is_dashing(&self) -> bool {
        self.dash_remaining > 0.0
    }

    /// Whether the hitbox is still waiting to grow.
    pub fn is_cramped(&self) -> bool {
        self.size != self.full_size
    }
}

fn become_small(avatar: &mut Avatar) {
    avatar.size = SMALL_SIZE;
    avatar.full_size = SMALL_SIZE;
}

fn become_big(avatar: &mut Avatar) {
    avatar.full_size = BIG_SIZE;
}

fn count_down(avatar: &mut Avatar, dt: f64) -> Option<PowerState> {
    avatar.invulnerable_for = (avatar.invulnerable_for - dt).max(0.0);
    None
}

fn power_machine(initial: PowerState) -> StateMachine<PowerState, Avatar> {
    let mut machine = StateMachine::new("power", initial);
    machine
        .register(
            PowerState::Small,
            StateHandlers::new().on_enter(become_small).on_update(count_down),
        )
        .register(
            PowerState::Big,
            StateHandlers::new().on_enter(become_big).on_update(count_down),
        )
        .register(
            PowerState::Fire,
            StateHandlers::new().on_enter(become_big).on_update(count_down),
        );
    machine
}

// ---------------------------------------------------------------------------
// Fireball
// ---------------------------------------------------------------------------

/// A projectile thrown by a Fire player. Flies straight until it hits a wall,
/// an enemy, or its lifetime runs out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fireball {
    pub id: u32,
    pub position: Vec2,
    pub previous_position: Vec2,
    pub velocity: Vec2,
    pub remaining: f64,
}

impl Fireball {
    pub const SIZE: f64 = 6.0;

    pub fn aabb(&self) -> Aabb {
        Aabb::new(
            self.position.x - Self::SIZE * 0.5,
            self.position.y - Self::SIZE * 0.5,
            Self::SIZE,
            Self::SIZE,
        )
    }
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// The player: avatar state plus its power-level machine.
pub struct Player {
    pub avatar: Avatar,
    power: StateMachine<PowerState, Avatar>,
}

/// What the player asked for this tick beyond moving.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerIntents {
    pub jumped: bool,
    pub dashed: bool,
    /// Throw a fireball from this point in this direction.
    pub fireball: Option<(Vec2, f64)>,
}

impl Player {
    /// A player standing at `position` with the given power level.
    pub fn spawn(position: Vec2, power: PowerState) -> Self {
        let mut avatar = Avatar {
            position,
            previous_position: position,
            body: PhysicsBody::grounded(),
            size: SMALL_SIZE,
            full_size: SMALL_SIZE,
            facing: 1.0,
            invulnerable_for: 0.0,
            dash_remaining: 0.0,
            dash_cooldown: 0.0,
            fire_cooldown: 0.0,
        };
        let mut machine = power_machine(power);
        machine.start(&mut avatar);
        Self {
            avatar,
            power: machine,
        }
    }

    pub fn power(&self) -> PowerState {
        self.power.current()
    }

    pub fn aabb(&self) -> Aabb {
        self.avatar.aabb()
    }

    pub fn position(&self) -> Vec2 {
        self.avatar.position
    }

    /// Turn held controls and buffered presses into velocity for this tick.
    ///
    /// Called before integration. Jumps need `can_jump` (ground or coyote
    /// time) *and* a buffered press; the press is only consumed when the
    /// jump happens, so a press shortly before landing still counts.
    pub fn apply_intents(
        &mut self,
        ctx: &mut SimulationContext<'_>,
        config: &PlayerConfig,
    ) -> PlayerIntents {
        let dt = ctx.dt;
        let physics = ctx.physics;
        let mut intents = PlayerIntents::default();
        let avatar = &mut self.avatar;

        avatar.dash_cooldown = (avatar.dash_cooldown - dt).max(0.0);
        avatar.fire_cooldown = (avatar.fire_cooldown - dt).max(0.0);

        let axis = ctx.controls.axis();
        if axis != 0.0 {
            avatar.facing = axis.signum();
        }

        if avatar.dash_cooldown <= 0.0 && ctx.input.try_consume(Action::Dash, ctx.now) {
            avatar.dash_remaining = config.dash_duration;
            avatar.dash_cooldown = config.dash_cooldown;
            intents.dashed = true;
            tracing::trace!(facing = avatar.facing, "dash");
        }

        if avatar.body.can_jump(physics) && ctx.input.try_consume(Action::Jump, ctx.now) {
            avatar.body.start_jump(physics);
            intents.jumped = true;
        }
        avatar.body.apply_jump_hold(ctx.controls.jump_held, dt, physics);

        if avatar.is_dashing() {
            avatar.dash_remaining = (avatar.dash_remaining - dt).max(0.0);
            avatar.body.gravity_scale = 0.0;
            avatar.body.velocity_y = avatar.body.velocity_y.min(0.0);
            avatar.body.set_horizontal(avatar.facing * config.dash_speed);
        } else {
            avatar.body.gravity_scale = 1.0;
            avatar.body.set_horizontal(axis * config.walk_speed);
        }

        if self.power.current() == PowerState::Fire
            && avatar.fire_cooldown <= 0.0
            && ctx.input.try_consume(Action::Attack, ctx.now)
        {
            avatar.fire_cooldown = config.fireball_cooldown;
            let center = avatar.aabb().center();
            intents.fireball = Some((center, avatar.facing));
        }

        intents
    }

    /// Grow the hitbox to the power level's size if the grown box is clear of
    /// solid tiles. Returns `true` if it grew.
    pub fn fit_hitbox<G: TileQuery + ?Sized>(&mut self, grid: &G) -> bool {
        let avatar = &mut self.avatar;
        if !avatar.is_cramped() {
            return false;
        }
        let grown = Aabb::from_feet(avatar.position, avatar.full_size.x, avatar.full_size.y);
        if overlaps_solid(grid, &grown) {
            return false;
        }
        avatar.size = avatar.full_size;
        tracing::trace!(height = avatar.size.y, "hitbox grown");
        true
    }

    /// Run the power machine's per-tick hook (invulnerability countdown).
    pub fn update_power(&mut self, dt: f64) {
        self.power.update(&mut self.avatar, dt);
    }

    /// Apply a pickup. Returns `true` if the power level changed.
    pub fn collect(&mut self, kind: PickupKind) -> bool {
        let target = match (kind, self.power.current()) {
            (PickupKind::Mushroom, PowerState::Small) => PowerState::Big,
            (PickupKind::FireFlower, _) => PowerState::Fire,
            _ => return false,
        };
        self.power.transition(target, &mut self.avatar).changed()
    }

    /// Apply a damage event.
    pub fn damage(&mut self, config: &PlayerConfig) -> DamageOutcome {
        if self.avatar.is_invulnerable() {
            return DamageOutcome::Ignored;
        }
        match self.power.current().downgraded() {
            Some(lower) => {
                self.power.transition(lower, &mut self.avatar);
                self.avatar.invulnerable_for = config.invulnerability;
                tracing::debug!(power = ?lower, "player hurt");
                DamageOutcome::Downgraded(lower)
            }
            None => DamageOutcome::Died,
        }
    }

    /// Put the player back at `position` as Small, briefly invulnerable.
    pub fn respawn(&mut self, position: Vec2, config: &PlayerConfig) {
        self.power.transition(PowerState::Small, &mut self.avatar);
        let avatar = &mut self.avatar;
        avatar.position = position;
        avatar.previous_position = position;
        avatar.body = PhysicsBody::grounded();
        avatar.dash_remaining = 0.0;
        avatar.invulnerable_for = config.invulnerability;
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("power", &self.power.current())
            .field("avatar", &self.avatar)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
