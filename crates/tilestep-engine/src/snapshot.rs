//! Render snapshots and state hashing.
//!
//! After each frame the host receives a [`RenderSnapshot`]: an owned,
//! read-only copy of everything drawable. Each entity carries both its
//! previous and current position plus the pre-blended `interpolated`
//! position, so a renderer can draw smooth motion at any display rate without
//! touching simulation state.

use serde::{Deserialize, Serialize};
use tilestep_core::geometry::Vec2;

use crate::enemy::Behavior;
use crate::flow::FlowState;
use crate::player::{Fireball, PowerState};
use crate::world::{World, PICKUP_SIZE};

// ---------------------------------------------------------------------------
// Hashing helpers
// ---------------------------------------------------------------------------

/// BLAKE3 hex digest of the canonical JSON encoding of `state`.
pub(crate) fn compute_hash<T: Serialize>(state: &T) -> String {
    match serde_json::to_vec(state) {
        Ok(bytes) => blake3::hash(&bytes).to_hex().to_string(),
        Err(error) => {
            // Only reachable with non-string map keys, which no hashed type has.
            tracing::error!(%error, "state is not serializable; hashing nothing");
            blake3::hash(&[]).to_hex().to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    Enemy,
    Fireball,
    Pickup,
}

/// Which animation a renderer should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisualState {
    Idle,
    Running,
    Jumping,
    Falling,
    Dashing,
    Behavior(Behavior),
    Flying,
    Item,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: u32,
    pub kind: EntityKind,
    /// Feet-centre origin (box centre for fireballs) at the last tick.
    pub position: Vec2,
    /// The same point one tick earlier.
    pub previous: Vec2,
    /// `previous` blended towards `position` by the snapshot's alpha.
    pub interpolated: Vec2,
    /// Width and height of the entity's box.
    pub size: Vec2,
    pub visual_state: VisualState,
    /// Facing direction, +1 right and -1 left.
    pub facing: f64,
    /// Power level, for the player only.
    pub power: Option<PowerState>,
    /// Whether the entity should blink (player invulnerability).
    pub blinking: bool,
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSnapshot {
    /// Ticks executed in the current level.
    pub tick: u64,
    /// Interpolation factor in `[0, 1)`.
    pub alpha: f64,
    pub flow: FlowState,
    pub level: Option<String>,
    pub entities: Vec<EntitySnapshot>,
    pub lives: u32,
    pub score: u64,
}

impl RenderSnapshot {
    /// A snapshot with no level loaded (menus, loading screens).
    pub fn empty(alpha: f64, flow: FlowState, lives: u32, score: u64) -> Self {
        Self {
            tick: 0,
            alpha,
            flow,
            level: None,
            entities: Vec::new(),
            lives,
            score,
        }
    }

    /// Capture `world` as of its last tick.
    pub fn capture(world: &World, alpha: f64, flow: FlowState) -> Self {
        let blend = |previous: Vec2, position: Vec2| previous.lerp(position, alpha);
        let mut entities = Vec::new();

        let player = world.player();
        let avatar = &player.avatar;
        entities.push(EntitySnapshot {
            id: 0,
            kind: EntityKind::Player,
            position: avatar.position,
            previous: avatar.previous_position,
            interpolated: blend(avatar.previous_position, avatar.position),
            size: avatar.size,
            visual_state: player_visual(world),
            facing: avatar.facing,
            power: Some(player.power()),
            blinking: avatar.is_invulnerable(),
        });

        for enemy in world.enemies().iter().filter(|e| e.is_alive()) {
            let state = &enemy.state;
            entities.push(EntitySnapshot {
                id: enemy.id,
                kind: EntityKind::Enemy,
                position: state.position,
                previous: state.previous_position,
                interpolated: blend(state.previous_position, state.position),
                size: Vec2::new(state.params.width, state.params.height),
                visual_state: VisualState::Behavior(enemy.behavior()),
                facing: state.facing,
                power: None,
                blinking: false,
            });
        }

        for fireball in world.fireballs() {
            entities.push(EntitySnapshot {
                id: fireball.id,
                kind: EntityKind::Fireball,
                position: fireball.position,
                previous: fireball.previous_position,
                interpolated: blend(fireball.previous_position, fireball.position),
                size: Vec2::new(Fireball::SIZE, Fireball::SIZE),
                visual_state: VisualState::Flying,
                facing: fireball.velocity.x.signum(),
                power: None,
                blinking: false,
            });
        }

        for pickup in world.pickups().iter().filter(|p| !p.collected) {
            entities.push(EntitySnapshot {
                id: pickup.id,
                kind: EntityKind::Pickup,
                position: pickup.position,
                previous: pickup.position,
                interpolated: pickup.position,
                size: Vec2::new(PICKUP_SIZE, PICKUP_SIZE),
                visual_state: VisualState::Item,
                facing: 1.0,
                power: None,
                blinking: false,
            });
        }

        let progress = world.progress();
        Self {
            tick: world.tick_count(),
            alpha,
            flow,
            level: Some(world.level().id.clone()),
            entities,
            lives: progress.lives,
            score: progress.score,
        }
    }

    pub fn player(&self) -> Option<&EntitySnapshot> {
        self.entities.iter().find(|e| e.kind == EntityKind::Player)
    }
}

fn player_visual(world: &World) -> VisualState {
    let avatar = &world.player().avatar;
    if avatar.is_dashing() {
        VisualState::Dashing
    } else if !avatar.body.on_ground {
        if avatar.body.velocity_y < 0.0 {
            VisualState::Jumping
        } else {
            VisualState::Falling
        }
    } else if avatar.body.velocity_x != 0.0 {
        VisualState::Running
    } else {
        VisualState::Idle
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
