//! Headless run: a random bot plays through the demo levels without a
//! renderer.
//!
//! Run with:
//!
//! ```text
//! cargo run --example headless_run                 # built-in levels, seed 7
//! cargo run --example headless_run -- 42           # another seed
//! cargo run --example headless_run -- 42 ./levels  # levels from <dir>/<id>.json
//! RUST_LOG=tilestep_engine=debug cargo run --example headless_run
//! ```
//!
//! The same seed always produces the same final state hash.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde_json::json;
use tilestep_engine::prelude::*;

/// Host frame period in milliseconds (a 60 Hz display).
const FRAME_MS: f64 = 1000.0 / 60.0;
const MAX_FRAMES: u64 = 60 * 120;

// ---------------------------------------------------------------------------
// Levels
// ---------------------------------------------------------------------------

fn demo_levels() -> Result<InMemoryLevels, EngineError> {
    let first = LevelDescriptor::from_json_str(
        &json!({
            "id": "1-1",
            "rows": [
                "..............................",
                "..............................",
                "..........====.......====.....",
                "..............................",
                ".....#...............#........",
                "#######....#######.###########"
            ],
            "spawn": { "x": 24.0, "y": 80.0 },
            "enemies": [
                { "kind": "Walker", "position": { "x": 200.0, "y": 80.0 } },
                { "kind": "Skittish", "position": { "x": 400.0, "y": 80.0 } }
            ],
            "pickups": [
                { "kind": "Coin", "position": { "x": 184.0, "y": 32.0 } },
                { "kind": "Mushroom", "position": { "x": 72.0, "y": 64.0 } }
            ],
            "checkpoints": [{ "x": 320.0, "y": 80.0 }],
            "goal": { "x": 448.0, "y": 48.0, "width": 16.0, "height": 32.0 },
            "next": "1-2"
        })
        .to_string(),
    )?;
    let second = LevelDescriptor::from_json_str(
        &json!({
            "id": "1-2",
            "rows": [
                "..............................",
                "..............................",
                "...............====...........",
                "..............................",
                "##############################"
            ],
            "spawn": { "x": 24.0, "y": 64.0 },
            "enemies": [
                { "kind": "Charger", "position": { "x": 320.0, "y": 64.0 } }
            ],
            "pickups": [
                { "kind": "FireFlower", "position": { "x": 120.0, "y": 64.0 } }
            ],
            "goal": { "x": 456.0, "y": 32.0, "width": 16.0, "height": 32.0 }
        })
        .to_string(),
    )?;
    Ok(InMemoryLevels::new("1-1", vec![first, second]))
}

// ---------------------------------------------------------------------------
// Bot
// ---------------------------------------------------------------------------

/// Mostly runs right, with random jumps, dashes and fireballs.
struct Bot {
    rng: Pcg64,
    jump_hold: u32,
}

impl Bot {
    fn new(seed: u64) -> Self {
        Self {
            rng: Pcg64::seed_from_u64(seed),
            jump_hold: 0,
        }
    }

    fn drive(&mut self, sim: &mut Simulation, timestamp_ms: f64) {
        let mut controls = ControlState {
            move_x: if self.rng.gen_bool(0.85) { 1.0 } else { -1.0 },
            jump_held: self.jump_hold > 0,
        };
        self.jump_hold = self.jump_hold.saturating_sub(1);

        let timestamp = timestamp_ms / 1000.0;
        if self.rng.gen_bool(0.06) {
            sim.push_input(InputEvent {
                action: Action::Jump,
                timestamp,
            });
            self.jump_hold = self.rng.gen_range(2..12);
            controls.jump_held = true;
        }
        if self.rng.gen_bool(0.01) {
            sim.push_input(InputEvent {
                action: Action::Dash,
                timestamp,
            });
        }
        if self.rng.gen_bool(0.03) {
            sim.push_input(InputEvent {
                action: Action::Attack,
                timestamp,
            });
        }
        sim.set_controls(controls);
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let seed: u64 = match args.next() {
        Some(text) => text.parse()?,
        None => 7,
    };
    let levels: Box<dyn LevelSource> = match args.next() {
        Some(dir) => Box::new(DirectoryLevels::new(dir, "1-1")),
        None => Box::new(demo_levels()?),
    };

    let config = SimConfig::default();
    config.validate()?;
    let mut sim = Simulation::new(config, levels, Box::new(MemoryStore::new()));
    let mut bot = Bot::new(seed);

    let mut games = 0;
    let mut frame: u64 = 0;
    let mut last = sim.frame(0.0, TimeUnit::Milliseconds);
    while frame < MAX_FRAMES {
        frame += 1;
        let timestamp = frame as f64 * FRAME_MS;
        match last.flow {
            FlowState::Playing => bot.drive(&mut sim, timestamp),
            FlowState::GameOver | FlowState::LevelComplete => sim.confirm(),
            // Back in the menu after a finished game.
            FlowState::MainMenu if games > 0 => break,
            FlowState::MainMenu => {
                games += 1;
                sim.start_new_game();
            }
            FlowState::Loading | FlowState::Paused => {}
        }
        last = sim.frame(timestamp, TimeUnit::Milliseconds);

        for report in sim.last_frame_reports() {
            for event in &report.events {
                tracing::debug!(tick = report.tick, ?event, "event");
            }
        }
    }

    if let Some(error) = sim.load_error() {
        anyhow::bail!("level load failed: {error}");
    }

    tracing::info!(
        seed,
        frames = frame,
        flow = ?last.flow,
        level = ?last.level,
        lives = last.lives,
        score = last.score,
        "run finished"
    );
    if let Some(world) = sim.world() {
        tracing::info!(tick = world.tick_count(), hash = %world.state_hash(), "final world");
    }
    if let Some(save) = sim.available_save() {
        tracing::info!(level = %save.level_id, score = save.score, "latest save");
    }
    Ok(())
}
