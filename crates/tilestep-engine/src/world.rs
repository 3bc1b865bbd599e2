//! One level in play.
//!
//! [`World::tick`] advances everything by exactly one fixed step, always in
//! the same order:
//!
//! 1. Drain queued presses into the input buffer, stamped with this tick's
//!    simulation time.
//! 2. Remember every entity's position (for render interpolation).
//! 3. Player intents (dash, walk, jump, fireballs), then the power machine.
//! 4. Enemy behaviour machines.
//! 5. Integrate and resolve every body against the tile grid.
//! 6. Interactions: pickups, fireball hits, stomps and damage, checkpoints,
//!    the goal, falls out of the level.
//! 7. Sweep expired presses.
//!
//! The world never reads wall-clock time and never performs I/O, so the same
//! level, configuration, starting progress and per-tick inputs always produce
//! the same [`state_hash`](World::state_hash) sequence.

use serde::{Deserialize, Serialize};
use tilestep_core::collision::{resolve, Resolution};
use tilestep_core::geometry::{Aabb, Vec2};
use tilestep_core::input::{Action, ControlState, InputBuffer, InputEvent, InputQueue};
use tilestep_core::physics::{PhysicsBody, PhysicsConfig};
use tilestep_core::tile::TileGrid;

use crate::config::SimConfig;
use crate::enemy::{Behavior, Enemy, EnemyState};
use crate::level::{Level, PickupKind};
use crate::player::{Avatar, DamageOutcome, Fireball, Player, PowerState};
use crate::snapshot::compute_hash;

/// How far (world units) above an enemy's top the player's feet may have been
/// on the previous tick for a contact to count as a stomp.
const STOMP_TOLERANCE: f64 = 4.0;

/// Edge length of a pickup's box.
pub const PICKUP_SIZE: f64 = 12.0;

// ---------------------------------------------------------------------------
// SimulationContext
// ---------------------------------------------------------------------------

/// Per-tick data handed to behaviour code.
pub struct SimulationContext<'a> {
    /// Fixed step in seconds.
    pub dt: f64,
    /// Simulation time at the start of this tick.
    pub now: f64,
    pub input: &'a mut InputBuffer,
    pub controls: ControlState,
    pub physics: &'a PhysicsConfig,
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// What carries over between levels and sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub lives: u32,
    pub score: u64,
    pub power: PowerState,
    /// Respawn point within the current level, if a checkpoint was reached.
    pub checkpoint: Option<Vec2>,
}

impl Progress {
    /// A fresh game.
    pub fn new(lives: u32) -> Self {
        Self {
            lives,
            score: 0,
            power: PowerState::Small,
            checkpoint: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Events and reports
// ---------------------------------------------------------------------------

/// Something noteworthy that happened during a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorldEvent {
    Jumped,
    Dashed,
    FireballThrown { id: u32 },
    PickupCollected { id: u32, kind: PickupKind },
    PowerChanged { from: PowerState, to: PowerState },
    PlayerHurt { power: PowerState },
    PlayerDied { lives_left: u32 },
    Respawned { position: Vec2 },
    EnemyStomped { id: u32 },
    EnemyHit { id: u32 },
    EnemyBurned { id: u32 },
    CheckpointReached { index: usize },
    LevelCompleted,
    GameOver,
    /// A body started the tick inside solid tiles and was pushed out.
    /// Id 0 is the player.
    PushedOut { id: u32 },
    /// A body is inside solid tiles with no way out and did not move.
    Stuck { id: u32 },
}

impl WorldEvent {
    /// The collision diagnostic for `resolution`, if it has one.
    fn from_resolution(id: u32, resolution: &Resolution) -> Option<Self> {
        if resolution.stuck {
            Some(WorldEvent::Stuck { id })
        } else if resolution.depenetrated {
            Some(WorldEvent::PushedOut { id })
        } else {
            None
        }
    }
}

/// What one call to [`World::tick`] consumed and produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Index of the tick that ran (0 for the first).
    pub tick: u64,
    pub controls: ControlState,
    /// Presses drained into the buffer at the start of the tick.
    pub presses: Vec<Action>,
    pub events: Vec<WorldEvent>,
}

/// A collectible placed in the level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pickup {
    pub id: u32,
    pub kind: PickupKind,
    /// Feet-centre origin.
    pub position: Vec2,
    pub collected: bool,
}

impl Pickup {
    pub fn aabb(&self) -> Aabb {
        Aabb::from_feet(self.position, PICKUP_SIZE, PICKUP_SIZE)
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// A level being played.
pub struct World {
    level: Level,
    config: SimConfig,
    tick: u64,
    player: Player,
    enemies: Vec<Enemy>,
    fireballs: Vec<Fireball>,
    pickups: Vec<Pickup>,
    checkpoints_reached: Vec<bool>,
    queue: InputQueue,
    input: InputBuffer,
    controls: ControlState,
    progress: Progress,
    next_id: u32,
    completed: bool,
    game_over: bool,
}

impl World {
    /// Start playing `level` with the given carried-over progress.
    ///
    /// The player appears at `progress.checkpoint` if set, otherwise at the
    /// level's spawn point. Checkpoints behind that point count as reached.
    pub fn new(level: Level, config: SimConfig, progress: Progress) -> Self {
        let start = progress.checkpoint.unwrap_or(level.spawn);
        let mut player = Player::spawn(start, progress.power);
        player.fit_hitbox(&level.grid);

        // Id 0 is the player.
        let mut next_id = 1;
        let mut enemies = Vec::with_capacity(level.enemies.len());
        for spawn in &level.enemies {
            enemies.push(Enemy::spawn(
                next_id,
                spawn.kind,
                spawn.position,
                config.enemies.params(spawn.kind),
            ));
            next_id += 1;
        }
        let mut pickups = Vec::with_capacity(level.pickups.len());
        for spawn in &level.pickups {
            pickups.push(Pickup {
                id: next_id,
                kind: spawn.kind,
                position: spawn.position,
                collected: false,
            });
            next_id += 1;
        }
        let checkpoints_reached = level
            .checkpoints
            .iter()
            .map(|cp| progress.checkpoint.is_some_and(|at| cp.x <= at.x))
            .collect();

        tracing::info!(
            level = %level.id,
            enemies = enemies.len(),
            pickups = pickups.len(),
            lives = progress.lives,
            "world created"
        );

        Self {
            input: InputBuffer::from_config(&config.input),
            level,
            config,
            tick: 0,
            player,
            enemies,
            fireballs: Vec::new(),
            pickups,
            checkpoints_reached,
            queue: InputQueue::new(),
            controls: ControlState::default(),
            progress,
            next_id,
            completed: false,
            game_over: false,
        }
    }

    /// Queue a press. It is observed by the next tick.
    pub fn push_input(&mut self, event: InputEvent) {
        self.queue.push(event);
    }

    /// Set the held controls used from the next tick on.
    pub fn set_controls(&mut self, controls: ControlState) {
        self.controls = controls;
    }

    /// Advance the world by one fixed step.
    pub fn tick(&mut self) -> TickReport {
        let dt = self.config.clock.fixed_step;
        let now = self.tick as f64 * dt;
        let tick = self.tick;
        let presses: Vec<Action> = self
            .queue
            .drain_into(&mut self.input, now)
            .iter()
            .map(|event| event.action)
            .collect();
        let controls = self.controls;
        let mut events = Vec::new();

        if !self.completed && !self.game_over {
            self.step(dt, now, controls, &mut events);
        }

        self.input.sweep(now);
        self.progress.power = self.player.power();
        self.tick += 1;

        if !events.is_empty() {
            tracing::debug!(tick, ?events, "tick events");
        }
        TickReport {
            tick,
            controls,
            presses,
            events,
        }
    }

    fn step(&mut self, dt: f64, now: f64, controls: ControlState, events: &mut Vec<WorldEvent>) {
        self.player.avatar.previous_position = self.player.avatar.position;
        for enemy in &mut self.enemies {
            enemy.state.previous_position = enemy.state.position;
        }
        for fireball in &mut self.fireballs {
            fireball.previous_position = fireball.position;
        }

        // Behaviour.
        let mut ctx = SimulationContext {
            dt,
            now,
            input: &mut self.input,
            controls,
            physics: &self.config.physics,
        };
        let intents = self.player.apply_intents(&mut ctx, &self.config.player);
        if intents.jumped {
            events.push(WorldEvent::Jumped);
        }
        if intents.dashed {
            events.push(WorldEvent::Dashed);
        }
        if let Some((origin, direction)) = intents.fireball {
            if self.fireballs.len() < self.config.player.max_fireballs {
                let id = self.allocate_id();
                self.fireballs.push(Fireball {
                    id,
                    position: origin,
                    previous_position: origin,
                    velocity: Vec2::new(direction * self.config.player.fireball_speed, 0.0),
                    remaining: self.config.player.fireball_lifetime,
                });
                events.push(WorldEvent::FireballThrown { id });
            }
        }
        self.player.update_power(dt);
        self.player.fit_hitbox(&self.level.grid);

        let target = Some(self.player.aabb().center());
        for enemy in &mut self.enemies {
            enemy.think(target, &self.level.grid, dt);
        }

        // Motion.
        let grid = &self.level.grid;
        let physics = &self.config.physics;
        let avatar = &mut self.player.avatar;
        let resolution = move_avatar(avatar, grid, physics, dt);
        events.extend(WorldEvent::from_resolution(0, &resolution));
        for enemy in self.enemies.iter_mut().filter(|e| e.is_alive()) {
            let resolution = move_enemy(&mut enemy.state, grid, physics, dt);
            events.extend(WorldEvent::from_resolution(enemy.id, &resolution));
        }
        let out_of_level = grid.world_height() + self.config.player.fall_death_margin;
        for enemy in self.enemies.iter_mut().filter(|e| e.is_alive()) {
            if enemy.aabb().top() > out_of_level {
                enemy.defeat();
            }
        }
        self.fireballs.retain_mut(|fireball| move_fireball(fireball, grid, dt));

        // Interactions.
        self.collect_pickups(events);
        self.burn_enemies(events);
        if self.enemy_contacts(events) {
            return;
        }
        self.reach_checkpoints(events);
        self.reach_goal(events);
        if self.player.aabb().top() > out_of_level {
            tracing::debug!(tick = self.tick, "player fell out of the level");
            self.lose_life(events);
        }
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn collect_pickups(&mut self, events: &mut Vec<WorldEvent>) {
        let player_box = self.player.aabb();
        let scores = &self.config.scores;
        for pickup in self.pickups.iter_mut().filter(|p| !p.collected) {
            if !pickup.aabb().overlaps(&player_box) {
                continue;
            }
            pickup.collected = true;
            events.push(WorldEvent::PickupCollected {
                id: pickup.id,
                kind: pickup.kind,
            });
            let before = self.player.power();
            if pickup.kind != PickupKind::Coin && self.player.collect(pickup.kind) {
                self.player.fit_hitbox(&self.level.grid);
                self.progress.score += scores.power_up;
                events.push(WorldEvent::PowerChanged {
                    from: before,
                    to: self.player.power(),
                });
            } else {
                self.progress.score += scores.coin;
            }
        }
    }

    fn burn_enemies(&mut self, events: &mut Vec<WorldEvent>) {
        let scores = &self.config.scores;
        let enemies = &mut self.enemies;
        let progress = &mut self.progress;
        self.fireballs.retain(|fireball| {
            let fire_box = fireball.aabb();
            let Some(enemy) = enemies
                .iter_mut()
                .find(|e| e.is_alive() && e.aabb().overlaps(&fire_box))
            else {
                return true;
            };
            if enemy.hurt() {
                progress.score += scores.fireball_kill;
                events.push(WorldEvent::EnemyBurned { id: enemy.id });
            } else {
                events.push(WorldEvent::EnemyHit { id: enemy.id });
            }
            false
        });
    }

    /// Stomps, body contact and attacks. Returns `true` if the player died.
    fn enemy_contacts(&mut self, events: &mut Vec<WorldEvent>) -> bool {
        let player_box = self.player.aabb();
        let player_center = player_box.center();
        let previous_feet = self.player.avatar.previous_position.y;
        let falling = self.player.avatar.body.velocity_y > 0.0;

        for index in 0..self.enemies.len() {
            let enemy = &self.enemies[index];
            if !enemy.is_alive() {
                continue;
            }
            let enemy_box = enemy.aabb();
            let touching = enemy_box.overlaps(&player_box);
            let struck = enemy.state.strike
                && enemy_box.center().distance(player_center)
                    <= enemy.state.params.attack_radius + player_box.width * 0.5;

            if touching && falling && previous_feet <= enemy_box.top() + STOMP_TOLERANCE {
                let enemy = &mut self.enemies[index];
                enemy.defeat();
                let id = enemy.id;
                self.player.avatar.body.launch(self.config.player.stomp_bounce);
                self.progress.score += self.config.scores.stomp;
                events.push(WorldEvent::EnemyStomped { id });
                continue;
            }
            if (touching || struck) && self.hurt_player(events) {
                return true;
            }
        }
        false
    }

    fn hurt_player(&mut self, events: &mut Vec<WorldEvent>) -> bool {
        match self.player.damage(&self.config.player) {
            DamageOutcome::Ignored => false,
            DamageOutcome::Downgraded(power) => {
                events.push(WorldEvent::PlayerHurt { power });
                false
            }
            DamageOutcome::Died => {
                self.lose_life(events);
                true
            }
        }
    }

    fn lose_life(&mut self, events: &mut Vec<WorldEvent>) {
        self.progress.lives = self.progress.lives.saturating_sub(1);
        events.push(WorldEvent::PlayerDied {
            lives_left: self.progress.lives,
        });
        if self.progress.lives == 0 {
            self.game_over = true;
            tracing::info!(level = %self.level.id, score = self.progress.score, "game over");
            events.push(WorldEvent::GameOver);
            return;
        }
        let position = self.progress.checkpoint.unwrap_or(self.level.spawn);
        self.player.respawn(position, &self.config.player);
        self.fireballs.clear();
        self.input.clear();
        tracing::info!(lives = self.progress.lives, x = position.x, y = position.y, "player respawned");
        events.push(WorldEvent::Respawned { position });
    }

    fn reach_checkpoints(&mut self, events: &mut Vec<WorldEvent>) {
        let feet = self.player.position();
        for (index, checkpoint) in self.level.checkpoints.iter().enumerate() {
            if self.checkpoints_reached[index] || feet.x < checkpoint.x {
                continue;
            }
            self.checkpoints_reached[index] = true;
            self.progress.checkpoint = Some(*checkpoint);
            events.push(WorldEvent::CheckpointReached { index });
        }
    }

    fn reach_goal(&mut self, events: &mut Vec<WorldEvent>) {
        let Some(goal) = self.level.goal else {
            return;
        };
        if goal.overlaps(&self.player.aabb()) {
            self.completed = true;
            self.progress.score += self.config.scores.level_complete;
            tracing::info!(level = %self.level.id, score = self.progress.score, "level complete");
            events.push(WorldEvent::LevelCompleted);
        }
    }

    // -- Accessors ----------------------------------------------------------

    /// Number of ticks executed so far.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Simulation time at the start of the next tick.
    pub fn sim_time(&self) -> f64 {
        self.tick as f64 * self.config.clock.fixed_step
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn enemies(&self) -> &[Enemy] {
        &self.enemies
    }

    pub fn fireballs(&self) -> &[Fireball] {
        &self.fireballs
    }

    pub fn pickups(&self) -> &[Pickup] {
        &self.pickups
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn controls(&self) -> ControlState {
        self.controls
    }

    pub fn input_buffer(&self) -> &InputBuffer {
        &self.input
    }

    /// Whether the player reached the goal.
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Whether the player ran out of lives.
    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    /// BLAKE3 hex digest of everything that influences future ticks.
    ///
    /// Presses still waiting in the queue and the held controls are inputs,
    /// not state; they enter it when the next tick consumes them.
    pub fn state_hash(&self) -> String {
        #[derive(Serialize)]
        struct EnemyView<'a> {
            id: u32,
            behavior: Behavior,
            state: &'a EnemyState,
        }

        #[derive(Serialize)]
        struct HashableWorld<'a> {
            level: &'a str,
            tick: u64,
            fixed_step: f64,
            power: PowerState,
            player: &'a Avatar,
            enemies: Vec<EnemyView<'a>>,
            fireballs: &'a [Fireball],
            pickups: &'a [Pickup],
            checkpoints_reached: &'a [bool],
            input: &'a InputBuffer,
            progress: &'a Progress,
            next_id: u32,
            completed: bool,
            game_over: bool,
        }

        let hashable = HashableWorld {
            level: &self.level.id,
            tick: self.tick,
            fixed_step: self.config.clock.fixed_step,
            power: self.player.power(),
            player: &self.player.avatar,
            enemies: self
                .enemies
                .iter()
                .map(|enemy| EnemyView {
                    id: enemy.id,
                    behavior: enemy.behavior(),
                    state: &enemy.state,
                })
                .collect(),
            fireballs: &self.fireballs,
            pickups: &self.pickups,
            checkpoints_reached: &self.checkpoints_reached,
            input: &self.input,
            progress: &self.progress,
            next_id: self.next_id,
            completed: self.completed,
            game_over: self.game_over,
        };
        compute_hash(&hashable)
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("level", &self.level.id)
            .field("tick", &self.tick)
            .field("player", &self.player)
            .field("enemies", &self.enemies.len())
            .field("progress", &self.progress)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Motion
// ---------------------------------------------------------------------------

fn move_body(
    body: &mut PhysicsBody,
    position: &mut Vec2,
    size: Vec2,
    grid: &TileGrid,
    physics: &PhysicsConfig,
    dt: f64,
) -> Resolution {
    body.integrate(dt, physics);
    let aabb = Aabb::from_feet(*position, size.x, size.y);
    let resolution = resolve(&aabb, body.velocity(), grid, dt);
    *position = resolution.aabb.feet();
    body.set_velocity(resolution.velocity);
    body.apply_contacts(resolution.contacts, dt);
    resolution
}

fn move_avatar(avatar: &mut Avatar, grid: &TileGrid, physics: &PhysicsConfig, dt: f64) -> Resolution {
    move_body(&mut avatar.body, &mut avatar.position, avatar.size, grid, physics, dt)
}

fn move_enemy(state: &mut EnemyState, grid: &TileGrid, physics: &PhysicsConfig, dt: f64) -> Resolution {
    state.body.set_horizontal(state.intent_x);
    let size = Vec2::new(state.params.width, state.params.height);
    move_body(&mut state.body, &mut state.position, size, grid, physics, dt)
}

/// Returns `false` once the fireball is spent.
fn move_fireball(fireball: &mut Fireball, grid: &TileGrid, dt: f64) -> bool {
    fireball.remaining -= dt;
    if fireball.remaining <= 0.0 {
        return false;
    }
    let resolution = resolve(&fireball.aabb(), fireball.velocity, grid, dt);
    fireball.position = resolution.aabb.center();
    let hit_wall = resolution.contacts.left || resolution.contacts.right || resolution.stuck;
    let inside = fireball.position.x >= 0.0 && fireball.position.x <= grid.world_width();
    !hit_wall && inside
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
