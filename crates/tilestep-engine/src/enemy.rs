//! Enemy behaviour: one state machine per enemy, parameterised by kind.
//!
//! Every enemy runs the same five-state machine:
//!
//! ```text
//!            notices target             alert delay elapsed
//!   Patrol ------------------> Alert ------------------------> Chase
//!     ^                          |                              |   ^
//!     |        target lost       |     within attack radius     v   |
//!     +--------------------------+------------------------- Attack -+
//!
//!   any state --(hurt and target near)--> Flee --(target far)--> Patrol
//! ```
//!
//! Kinds differ only through [`EnemyParams`]: a `Walker` has no alert radius
//! and so never leaves `Patrol`, a `Charger` hunts the player down, and a
//! `Skittish` enemy is always "hurt enough" to run away.
//!
//! Each state's update hook computes the enemy's horizontal intent for the
//! tick. Perception (distance, line of sight, walls and ledges ahead) is
//! sampled by [`Enemy::think`] just before the machine runs.

use serde::{Deserialize, Serialize};
use tilestep_core::geometry::{Aabb, Vec2};
use tilestep_core::physics::PhysicsBody;
use tilestep_core::state_machine::{StateHandlers, StateMachine};
use tilestep_core::tile::{line_of_sight, TileQuery};

use crate::EngineError;

// ---------------------------------------------------------------------------
// Kinds and parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnemyKind {
    Walker,
    Charger,
    Skittish,
}

/// Per-kind behaviour tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnemyParams {
    pub patrol_speed: f64,
    pub chase_speed: f64,
    pub flee_speed: f64,
    /// Distance at which a visible target is noticed. 0 disables noticing.
    pub alert_radius: f64,
    /// Distance beyond which a chased target is lost.
    pub chase_radius: f64,
    pub attack_radius: f64,
    /// Seconds spent in `Alert` before giving chase.
    pub alert_delay: f64,
    /// Seconds from entering `Attack` to the strike.
    pub attack_windup: f64,
    /// Seconds after the strike before chasing again.
    pub attack_recovery: f64,
    /// Whether noticing needs a clear tile line to the target.
    pub requires_line_of_sight: bool,
    pub max_health: u32,
    /// Flee from a nearby target once health drops to this value.
    pub flee_threshold: u32,
    pub width: f64,
    pub height: f64,
}

impl Default for EnemyParams {
    fn default() -> Self {
        Self::walker()
    }
}

impl EnemyParams {
    pub fn walker() -> Self {
        Self {
            patrol_speed: 40.0,
            chase_speed: 0.0,
            flee_speed: 0.0,
            alert_radius: 0.0,
            chase_radius: 0.0,
            attack_radius: 0.0,
            alert_delay: 0.0,
            attack_windup: 0.0,
            attack_recovery: 0.0,
            requires_line_of_sight: false,
            max_health: 1,
            flee_threshold: 0,
            width: 14.0,
            height: 14.0,
        }
    }

    pub fn charger() -> Self {
        Self {
            patrol_speed: 40.0,
            chase_speed: 110.0,
            flee_speed: 90.0,
            alert_radius: 96.0,
            chase_radius: 160.0,
            attack_radius: 20.0,
            alert_delay: 0.4,
            attack_windup: 0.3,
            attack_recovery: 0.4,
            requires_line_of_sight: true,
            max_health: 2,
            flee_threshold: 1,
            width: 14.0,
            height: 20.0,
        }
    }

    pub fn skittish() -> Self {
        Self {
            patrol_speed: 50.0,
            chase_speed: 0.0,
            flee_speed: 130.0,
            alert_radius: 80.0,
            chase_radius: 128.0,
            attack_radius: 0.0,
            alert_delay: 0.0,
            attack_windup: 0.0,
            attack_recovery: 0.0,
            requires_line_of_sight: false,
            max_health: 1,
            flee_threshold: 1,
            width: 12.0,
            height: 12.0,
        }
    }

    fn validate(&self, kind: EnemyKind) -> Result<(), EngineError> {
        let values = [
            ("patrol_speed", self.patrol_speed),
            ("chase_speed", self.chase_speed),
            ("flee_speed", self.flee_speed),
            ("alert_radius", self.alert_radius),
            ("chase_radius", self.chase_radius),
            ("attack_radius", self.attack_radius),
            ("alert_delay", self.alert_delay),
            ("attack_windup", self.attack_windup),
            ("attack_recovery", self.attack_recovery),
        ];
        for (name, value) in values {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(EngineError::InvalidConfig(format!(
                    "enemies.{kind:?}.{name} must be non-negative and finite, got {value}"
                )));
            }
        }
        if !(self.width > 0.0 && self.height > 0.0) || self.max_health == 0 {
            return Err(EngineError::InvalidConfig(format!(
                "enemies.{kind:?} needs a positive size and at least 1 health"
            )));
        }
        Ok(())
    }
}

/// Parameters for every enemy kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnemyTuning {
    pub walker: EnemyParams,
    pub charger: EnemyParams,
    pub skittish: EnemyParams,
}

impl Default for EnemyTuning {
    fn default() -> Self {
        Self {
            walker: EnemyParams::walker(),
            charger: EnemyParams::charger(),
            skittish: EnemyParams::skittish(),
        }
    }
}

impl EnemyTuning {
    pub fn params(&self, kind: EnemyKind) -> &EnemyParams {
        match kind {
            EnemyKind::Walker => &self.walker,
            EnemyKind::Charger => &self.charger,
            EnemyKind::Skittish => &self.skittish,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), EngineError> {
        self.walker.validate(EnemyKind::Walker)?;
        self.charger.validate(EnemyKind::Charger)?;
        self.skittish.validate(EnemyKind::Skittish)
    }
}

// ---------------------------------------------------------------------------
// Behavior states
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Behavior {
    Patrol,
    Alert,
    Chase,
    Attack,
    Flee,
}

/// What the enemy sensed at the start of the tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Perception {
    /// Target point (the player's centre), if there is a player.
    pub target: Option<Vec2>,
    /// Distance from the enemy's centre to the target; infinite without one.
    pub distance: f64,
    /// Whether the target can be seen (always true for kinds that do not
    /// need line of sight).
    pub visible: bool,
    pub wall_ahead: bool,
    pub ledge_ahead: bool,
}

/// Everything about an enemy the behaviour hooks read and write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnemyState {
    pub kind: EnemyKind,
    pub params: EnemyParams,
    /// Feet-centre origin.
    pub position: Vec2,
    pub previous_position: Vec2,
    pub body: PhysicsBody,
    /// +1 facing right, -1 facing left.
    pub facing: f64,
    pub health: u32,
    pub alive: bool,
    /// Horizontal velocity requested by the active behaviour.
    pub intent_x: f64,
    pub perception: Perception,
    /// Seconds spent in the current behaviour (reset by enter hooks).
    pub state_timer: f64,
    /// Set for exactly one tick when an attack lands.
    pub strike: bool,
}

impl EnemyState {
    pub fn aabb(&self) -> Aabb {
        Aabb::from_feet(self.position, self.params.width, self.params.height)
    }

    fn target_dx(&self) -> f64 {
        self.perception
            .target
            .map_or(0.0, |target| target.x - self.aabb().center().x)
    }

    fn face_target(&mut self) {
        let dx = self.target_dx();
        if dx != 0.0 {
            self.facing = dx.signum();
        }
    }

    fn sees_within(&self, radius: f64) -> bool {
        radius > 0.0 && self.perception.visible && self.perception.distance <= radius
    }

    fn should_flee(&self) -> bool {
        self.health <= self.params.flee_threshold
            && self.sees_within(self.params.alert_radius.max(self.params.chase_radius))
    }

    fn blocked_ahead(&self) -> bool {
        self.perception.wall_ahead || (self.body.on_ground && self.perception.ledge_ahead)
    }
}

// -- Hooks ---------------------------------------------------------------------

fn reset_timer(s: &mut EnemyState) {
    s.state_timer = 0.0;
    s.intent_x = 0.0;
}

fn patrol(s: &mut EnemyState, dt: f64) -> Option<Behavior> {
    s.state_timer += dt;
    if s.should_flee() {
        return Some(Behavior::Flee);
    }
    if s.blocked_ahead() {
        s.facing = -s.facing;
    }
    s.intent_x = s.facing * s.params.patrol_speed;
    s.sees_within(s.params.alert_radius).then_some(Behavior::Alert)
}

fn alert(s: &mut EnemyState, dt: f64) -> Option<Behavior> {
    s.state_timer += dt;
    s.intent_x = 0.0;
    if s.should_flee() {
        return Some(Behavior::Flee);
    }
    s.face_target();
    if !s.sees_within(s.params.chase_radius.max(s.params.alert_radius)) {
        return Some(Behavior::Patrol);
    }
    (s.state_timer >= s.params.alert_delay).then_some(Behavior::Chase)
}

fn chase(s: &mut EnemyState, dt: f64) -> Option<Behavior> {
    s.state_timer += dt;
    if s.should_flee() {
        return Some(Behavior::Flee);
    }
    if !s.sees_within(s.params.chase_radius) {
        return Some(Behavior::Patrol);
    }
    s.face_target();
    s.intent_x = if s.blocked_ahead() {
        0.0
    } else {
        s.facing * s.params.chase_speed
    };
    (s.perception.distance <= s.params.attack_radius).then_some(Behavior::Attack)
}

fn attack(s: &mut EnemyState, dt: f64) -> Option<Behavior> {
    let before = s.state_timer;
    s.state_timer += dt;
    s.intent_x = 0.0;
    s.strike = before < s.params.attack_windup && s.state_timer >= s.params.attack_windup;
    (s.state_timer >= s.params.attack_windup + s.params.attack_recovery).then_some(Behavior::Chase)
}

fn end_attack(s: &mut EnemyState) {
    s.strike = false;
}

fn flee(s: &mut EnemyState, dt: f64) -> Option<Behavior> {
    s.state_timer += dt;
    let dx = s.target_dx();
    if dx != 0.0 {
        s.facing = -dx.signum();
    }
    s.intent_x = if s.blocked_ahead() {
        0.0
    } else {
        s.facing * s.params.flee_speed
    };
    (!s.sees_within(s.params.chase_radius.max(s.params.alert_radius))).then_some(Behavior::Patrol)
}

fn behavior_machine() -> StateMachine<Behavior, EnemyState> {
    let mut machine = StateMachine::new("enemy", Behavior::Patrol);
    machine
        .register(
            Behavior::Patrol,
            StateHandlers::new().on_enter(reset_timer).on_update(patrol),
        )
        .register(
            Behavior::Alert,
            StateHandlers::new().on_enter(reset_timer).on_update(alert),
        )
        .register(
            Behavior::Chase,
            StateHandlers::new().on_enter(reset_timer).on_update(chase),
        )
        .register(
            Behavior::Attack,
            StateHandlers::new()
                .on_enter(reset_timer)
                .on_exit(end_attack)
                .on_update(attack),
        )
        .register(
            Behavior::Flee,
            StateHandlers::new().on_enter(reset_timer).on_update(flee),
        );
    machine
}

// ---------------------------------------------------------------------------
// Enemy
// ---------------------------------------------------------------------------

/// An enemy: its state plus the behaviour machine that drives it.
pub struct Enemy {
    pub id: u32,
    pub state: EnemyState,
    behavior: StateMachine<Behavior, EnemyState>,
}

impl Enemy {
    /// Spawn an enemy standing at `position`, facing left.
    pub fn spawn(id: u32, kind: EnemyKind, position: Vec2, params: &EnemyParams) -> Self {
        let mut state = EnemyState {
            kind,
            params: params.clone(),
            position,
            previous_position: position,
            body: PhysicsBody::default(),
            facing: -1.0,
            health: params.max_health,
            alive: true,
            intent_x: 0.0,
            perception: Perception {
                distance: f64::INFINITY,
                ..Default::default()
            },
            state_timer: 0.0,
            strike: false,
        };
        let mut behavior = behavior_machine();
        behavior.start(&mut state);
        Self {
            id,
            state,
            behavior,
        }
    }

    pub fn behavior(&self) -> Behavior {
        self.behavior.current()
    }

    pub fn kind(&self) -> EnemyKind {
        self.state.kind
    }

    pub fn is_alive(&self) -> bool {
        self.state.alive
    }

    pub fn aabb(&self) -> Aabb {
        self.state.aabb()
    }

    /// Sample the surroundings, then run the behaviour machine for one tick.
    /// The resulting horizontal intent is left in `state.intent_x`.
    pub fn think<G: TileQuery + ?Sized>(&mut self, target: Option<Vec2>, grid: &G, dt: f64) {
        if !self.state.alive {
            return;
        }
        self.state.strike = false;
        self.state.perception = sense(&self.state, target, grid);
        self.behavior.update(&mut self.state, dt);
    }

    /// Apply one point of damage. Returns `true` if this defeated the enemy.
    pub fn hurt(&mut self) -> bool {
        if !self.state.alive {
            return false;
        }
        self.state.health = self.state.health.saturating_sub(1);
        if self.state.health == 0 {
            self.defeat();
            return true;
        }
        false
    }

    /// Remove the enemy from play (stomped, burned, or fell out of the level).
    pub fn defeat(&mut self) {
        self.state.alive = false;
        self.state.intent_x = 0.0;
        self.state.strike = false;
        tracing::debug!(id = self.id, kind = ?self.state.kind, "enemy defeated");
    }
}

impl std::fmt::Debug for Enemy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enemy")
            .field("id", &self.id)
            .field("behavior", &self.behavior.current())
            .field("state", &self.state)
            .finish()
    }
}

fn sense<G: TileQuery + ?Sized>(state: &EnemyState, target: Option<Vec2>, grid: &G) -> Perception {
    let aabb = state.aabb();
    let eye = aabb.center();

    let (distance, visible) = match target {
        Some(point) => {
            let distance = eye.distance(point);
            let visible = !state.params.requires_line_of_sight || line_of_sight(grid, eye, point);
            (distance, visible)
        }
        None => (f64::INFINITY, false),
    };

    let front = if state.facing > 0.0 {
        aabb.right() + 1.0
    } else {
        aabb.left() - 1.0
    };
    let col = grid.world_to_cell(front);
    let mid_row = grid.world_to_cell(eye.y);
    let below_row = grid.world_to_cell(aabb.bottom() + 1.0);

    Perception {
        target,
        distance,
        visible,
        wall_ahead: grid.is_solid(col, mid_row),
        ledge_ahead: !grid.is_solid(col, below_row) && !grid.is_one_way(col, below_row),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tilestep_core::tile::TileGrid;

    const DT: f64 = 1.0 / 60.0;

    fn arena() -> TileGrid {
        TileGrid::from_ascii(
            16.0,
            &[
                "....................",
                "....................",
                "#...................",
                "####################",
            ],
        )
        .unwrap()
    }

    fn grounded(kind: EnemyKind, x: f64) -> Enemy {
        let tuning = EnemyTuning::default();
        let mut enemy = Enemy::spawn(1, kind, Vec2::new(x, 48.0), tuning.params(kind));
        enemy.state.body.on_ground = true;
        enemy
    }

    #[test]
    fn walker_patrols_and_turns_at_walls() {
        let grid = arena();
        // Facing left, flush against the wall tile at column 0, row 2.
        let mut enemy = grounded(EnemyKind::Walker, 16.0 + 7.0);
        enemy.think(None, &grid, DT);
        assert_eq!(enemy.behavior(), Behavior::Patrol);
        assert_eq!(enemy.state.facing, 1.0);
        assert_eq!(enemy.state.intent_x, 40.0);
    }

    #[test]
    fn walker_turns_at_ledges() {
        let grid = TileGrid::from_ascii(16.0, &["......", "......", "..##.."]).unwrap();
        let mut enemy = grounded(EnemyKind::Walker, 32.0 + 7.0);
        enemy.state.position.y = 32.0;
        enemy.think(None, &grid, DT);
        assert_eq!(enemy.state.facing, 1.0, "column 1 has no floor");
    }

    #[test]
    fn walker_never_notices_the_player() {
        let grid = arena();
        let mut enemy = grounded(EnemyKind::Walker, 160.0);
        for _ in 0..120 {
            enemy.think(Some(Vec2::new(150.0, 40.0)), &grid, DT);
        }
        assert_eq!(enemy.behavior(), Behavior::Patrol);
    }

    #[test]
    fn charger_alerts_chases_and_strikes() {
        let grid = arena();
        let mut enemy = grounded(EnemyKind::Charger, 200.0);
        let target = Some(Vec2::new(130.0, 38.0));

        enemy.think(target, &grid, DT);
        assert_eq!(enemy.behavior(), Behavior::Alert);

        let mut ticks = 0;
        while enemy.behavior() == Behavior::Alert && ticks < 120 {
            enemy.think(target, &grid, DT);
            ticks += 1;
        }
        assert_eq!(enemy.behavior(), Behavior::Chase);
        assert!((ticks as f64 * DT - 0.4).abs() < 2.0 * DT, "alert lasted {ticks} ticks");

        enemy.think(target, &grid, DT);
        assert!(enemy.state.intent_x < 0.0, "chases towards the target");

        // Put the target in reach.
        let close = Some(enemy.aabb().center() + Vec2::new(-10.0, 0.0));
        enemy.think(close, &grid, DT);
        assert_eq!(enemy.behavior(), Behavior::Attack);

        let mut strikes = 0;
        for _ in 0..50 {
            enemy.think(close, &grid, DT);
            strikes += usize::from(enemy.state.strike);
        }
        assert_eq!(strikes, 1);
    }

    #[test]
    fn charger_needs_line_of_sight() {
        let grid = TileGrid::from_ascii(
            16.0,
            &[
                "....................",
                "........#...........",
                "........#...........",
                "####################",
            ],
        )
        .unwrap();
        let mut enemy = grounded(EnemyKind::Charger, 200.0);
        for _ in 0..30 {
            enemy.think(Some(Vec2::new(120.0, 38.0)), &grid, DT);
        }
        assert_eq!(enemy.behavior(), Behavior::Patrol);
    }

    #[test]
    fn lost_target_returns_to_patrol() {
        let grid = arena();
        let mut enemy = grounded(EnemyKind::Charger, 200.0);
        enemy.think(Some(Vec2::new(150.0, 38.0)), &grid, DT);
        assert_eq!(enemy.behavior(), Behavior::Alert);
        enemy.think(None, &grid, DT);
        assert_eq!(enemy.behavior(), Behavior::Patrol);
    }

    #[test]
    fn skittish_flees_from_nearby_target() {
        let grid = arena();
        let mut enemy = grounded(EnemyKind::Skittish, 160.0);
        enemy.think(Some(Vec2::new(120.0, 40.0)), &grid, DT);
        assert_eq!(enemy.behavior(), Behavior::Flee);
        enemy.think(Some(Vec2::new(120.0, 40.0)), &grid, DT);
        assert!(enemy.state.intent_x > 0.0, "runs away from the target");

        enemy.think(None, &grid, DT);
        assert_eq!(enemy.behavior(), Behavior::Patrol);
    }

    #[test]
    fn hurt_charger_flees() {
        let grid = arena();
        let mut enemy = grounded(EnemyKind::Charger, 200.0);
        assert!(!enemy.hurt());
        enemy.think(Some(Vec2::new(150.0, 38.0)), &grid, DT);
        assert_eq!(enemy.behavior(), Behavior::Flee);
        assert!(enemy.hurt());
        assert!(!enemy.is_alive());
    }

    #[test]
    fn default_tuning_validates() {
        EnemyTuning::default().validate().unwrap();
        let mut tuning = EnemyTuning::default();
        tuning.charger.chase_speed = f64::NAN;
        assert!(tuning.validate().is_err());
    }
}
