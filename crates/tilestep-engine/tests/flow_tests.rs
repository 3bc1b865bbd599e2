//! Integration tests for the host-facing [`Simulation`]: game flow,
//! pausing, level transitions, saves and asynchronous loading.

use std::path::PathBuf;

use tilestep_engine::prelude::*;
use tilestep_engine::save::SAVE_KEY;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Binary-exact step so every frame below runs exactly one tick.
const STEP: f64 = 1.0 / 64.0;

fn config() -> SimConfig {
    let mut config = SimConfig::default();
    config.clock.fixed_step = STEP;
    config
}

const FLAT: &[&str] = &["..........", "..........", "##########"];

fn level(id: &str, rows: &[&str], spawn: Vec2) -> LevelDescriptor {
    LevelDescriptor::new(id, rows, spawn)
}

/// A level whose goal covers the spawn point, completed on the first tick.
fn instant_level(id: &str, next: Option<&str>) -> LevelDescriptor {
    let mut desc = level(id, FLAT, Vec2::new(24.0, 32.0));
    desc.goal = Some(Aabb::new(0.0, 0.0, 48.0, 32.0));
    desc.next = next.map(str::to_owned);
    desc
}

/// Drives a [`Simulation`] with evenly spaced frame timestamps.
struct Host {
    sim: Simulation,
    frame: u64,
}

impl Host {
    fn new(sim: Simulation) -> Self {
        let mut host = Self { sim, frame: 0 };
        // The first frame only primes the clock.
        host.step();
        host
    }

    fn step(&mut self) -> RenderSnapshot {
        let snapshot = self.sim.frame(self.frame as f64 * STEP, TimeUnit::Seconds);
        self.frame += 1;
        snapshot
    }

    fn steps(&mut self, n: usize) -> RenderSnapshot {
        let mut snapshot = self.step();
        for _ in 1..n {
            snapshot = self.step();
        }
        snapshot
    }

    fn step_until(&mut self, state: FlowState, limit: usize) -> RenderSnapshot {
        for _ in 0..limit {
            let snapshot = self.step();
            if snapshot.flow == state {
                return snapshot;
            }
        }
        panic!(
            "flow never reached {state:?} within {limit} frames (stuck in {:?})",
            self.sim.flow_state()
        );
    }
}

fn host(levels: Vec<LevelDescriptor>, first: &str) -> Host {
    Host::new(Simulation::new(
        config(),
        Box::new(InMemoryLevels::new(first, levels)),
        Box::new(MemoryStore::new()),
    ))
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tilestep-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

// ---------------------------------------------------------------------------
// Menu and loading
// ---------------------------------------------------------------------------

#[test]
fn starts_in_main_menu_without_a_world() {
    let mut host = host(vec![level("a", FLAT, Vec2::new(24.0, 32.0))], "a");
    let snapshot = host.step();
    assert_eq!(snapshot.flow, FlowState::MainMenu);
    assert!(snapshot.entities.is_empty());
    assert!(snapshot.level.is_none());
    assert!(host.sim.available_save().is_none());
}

#[test]
fn start_loads_first_level_and_plays() {
    let mut host = host(vec![level("a", FLAT, Vec2::new(24.0, 32.0))], "a");
    host.sim.start_new_game();
    let snapshot = host.step_until(FlowState::Playing, 10);
    assert_eq!(snapshot.level.as_deref(), Some("a"));
    assert_eq!(snapshot.lives, 3);
    assert!(snapshot.player().is_some());

    host.steps(5);
    assert!(host.sim.world().unwrap().tick_count() >= 5);
    assert_eq!(host.sim.last_frame_reports().len(), 1);
}

#[test]
fn missing_level_returns_to_menu_with_error() {
    let mut host = host(Vec::new(), "ghost");
    host.sim.start_new_game();
    host.step_until(FlowState::Loading, 5);
    host.step_until(FlowState::MainMenu, 5);
    let error = host.sim.load_error().unwrap();
    assert!(error.contains("ghost"), "unexpected error: {error}");
    assert!(host.sim.world().is_none());
}

#[test]
fn presses_outside_play_are_dropped() {
    let mut host = host(vec![level("a", FLAT, Vec2::new(24.0, 32.0))], "a");
    host.sim.push_input(InputEvent {
        action: Action::Jump,
        timestamp: 0.0,
    });
    host.sim.start_new_game();
    host.step_until(FlowState::Playing, 10);
    let world = host.sim.world().unwrap();
    assert!(world.input_buffer().is_empty());
    assert_eq!(world.player().avatar.body.velocity_y, 0.0);
}

#[test]
fn levels_load_from_a_directory() {
    let dir = temp_dir("levels");
    let levels = DirectoryLevels::new(&dir, "d1");
    let json = serde_json::to_string(&level("d1", FLAT, Vec2::new(24.0, 32.0))).unwrap();
    std::fs::write(levels.path_for("d1"), json).unwrap();

    let mut host = Host::new(Simulation::new(
        config(),
        Box::new(levels),
        Box::new(MemoryStore::new()),
    ));
    host.sim.start_new_game();
    let mut playing = false;
    for _ in 0..500 {
        if host.step().flow == FlowState::Playing {
            playing = true;
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    assert!(playing, "directory load never finished");
    assert_eq!(host.sim.world().unwrap().level().id, "d1");
    let _ = std::fs::remove_dir_all(&dir);
}

// ---------------------------------------------------------------------------
// Pause
// ---------------------------------------------------------------------------

#[test]
fn pause_freezes_the_world() {
    // Spawned in the air so the player is visibly moving.
    let mut host = host(vec![level("a", FLAT, Vec2::new(24.0, 8.0))], "a");
    host.sim.start_new_game();
    host.step_until(FlowState::Playing, 10);
    host.steps(3);

    host.sim.pause();
    assert_eq!(host.step().flow, FlowState::Paused);
    let ticks = host.sim.world().unwrap().tick_count();
    let position = host.sim.world().unwrap().player().position();

    let snapshot = host.steps(30);
    assert_eq!(snapshot.flow, FlowState::Paused);
    assert_eq!(host.sim.world().unwrap().tick_count(), ticks);
    assert_eq!(host.sim.world().unwrap().player().position(), position);
    assert!(host.sim.last_frame_reports().is_empty());

    host.sim.resume();
    assert_eq!(host.step().flow, FlowState::Playing);
    host.steps(2);
    assert!(host.sim.world().unwrap().tick_count() > ticks);
}

#[test]
fn quitting_from_pause_returns_to_menu() {
    let mut host = host(vec![level("a", FLAT, Vec2::new(24.0, 32.0))], "a");
    host.sim.start_new_game();
    host.step_until(FlowState::Playing, 10);
    host.sim.pause();
    host.step();
    host.sim.quit();
    assert_eq!(host.step().flow, FlowState::MainMenu);
    assert!(host.sim.world().is_none());
}

// ---------------------------------------------------------------------------
// Level transitions and saves
// ---------------------------------------------------------------------------

#[test]
fn completing_a_level_saves_and_moves_on() {
    let levels = vec![
        instant_level("one", Some("two")),
        level("two", FLAT, Vec2::new(120.0, 32.0)),
    ];
    let mut host = host(levels, "one");
    host.sim.start_new_game();
    host.step_until(FlowState::LevelComplete, 10);

    let save = host.sim.available_save().unwrap().clone();
    assert_eq!(save.level_id, "two");
    assert_eq!(save.lives, 3);
    assert_eq!(save.score, host.sim.config().scores.level_complete);

    host.sim.confirm();
    host.step_until(FlowState::Playing, 10);
    let world = host.sim.world().unwrap();
    assert_eq!(world.level().id, "two");
    assert_eq!(world.player().position(), Vec2::new(120.0, 32.0));
    assert_eq!(world.progress().score, save.score);
}

#[test]
fn level_complete_screen_times_out() {
    let levels = vec![
        instant_level("one", Some("two")),
        level("two", FLAT, Vec2::new(24.0, 32.0)),
    ];
    let mut host = host(levels, "one");
    host.sim.start_new_game();
    host.step_until(FlowState::LevelComplete, 10);
    let delay_frames = (host.sim.config().level_complete_delay / STEP) as usize;
    host.step_until(FlowState::Playing, delay_frames + 10);
}

#[test]
fn finishing_the_last_level_returns_to_menu() {
    let mut host = host(vec![instant_level("only", None)], "only");
    host.sim.start_new_game();
    host.step_until(FlowState::LevelComplete, 10);
    assert_eq!(host.sim.available_save().unwrap().level_id, "only");
    host.sim.confirm();
    assert_eq!(host.step().flow, FlowState::MainMenu);
}

#[test]
fn saved_game_continues_in_a_new_session() {
    let dir = temp_dir("saves");
    let levels = || {
        Box::new(InMemoryLevels::new(
            "one",
            vec![
                instant_level("one", Some("two")),
                level("two", FLAT, Vec2::new(120.0, 32.0)),
            ],
        ))
    };

    let mut first = Host::new(Simulation::new(config(), levels(), Box::new(FileStore::new(&dir))));
    first.sim.start_new_game();
    first.step_until(FlowState::LevelComplete, 10);
    let saved = first.sim.available_save().unwrap().clone();
    assert!(FileStore::new(&dir).path_for(SAVE_KEY).exists());

    let mut second = Host::new(Simulation::new(config(), levels(), Box::new(FileStore::new(&dir))));
    assert_eq!(second.sim.available_save(), Some(&saved));
    second.sim.continue_game();
    second.step_until(FlowState::Playing, 10);
    let world = second.sim.world().unwrap();
    assert_eq!(world.level().id, "two");
    assert_eq!(world.progress().score, saved.score);
    assert_eq!(world.progress().lives, saved.lives);
    assert_eq!(world.player().position(), Vec2::new(120.0, 32.0));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn reached_checkpoint_survives_quit_and_continue() {
    let dir = temp_dir("checkpoint");
    let levels = || {
        let mut desc = level("a", FLAT, Vec2::new(24.0, 32.0));
        desc.checkpoints.push(Vec2::new(80.0, 32.0));
        Box::new(InMemoryLevels::new("a", vec![desc]))
    };

    let mut first = Host::new(Simulation::new(config(), levels(), Box::new(FileStore::new(&dir))));
    first.sim.set_controls(ControlState {
        move_x: 1.0,
        jump_held: false,
    });
    first.sim.start_new_game();
    first.step_until(FlowState::Playing, 10);
    for _ in 0..200 {
        if first.sim.available_save().is_some() {
            break;
        }
        first.step();
    }
    let saved = first.sim.available_save().unwrap().clone();
    assert_eq!(saved.level_id, "a");
    assert_eq!(saved.checkpoint, Vec2::new(80.0, 32.0));
    assert_eq!(saved.lives, 3);

    first.sim.pause();
    first.step();
    first.sim.quit();
    assert_eq!(first.step().flow, FlowState::MainMenu);

    let mut second = Host::new(Simulation::new(config(), levels(), Box::new(FileStore::new(&dir))));
    assert_eq!(second.sim.available_save(), Some(&saved));
    second.sim.continue_game();
    second.step_until(FlowState::Playing, 10);
    let world = second.sim.world().unwrap();
    assert_eq!(world.player().position(), Vec2::new(80.0, 32.0));
    assert_eq!(world.progress().checkpoint, Some(Vec2::new(80.0, 32.0)));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn continue_without_a_save_stays_in_menu() {
    let mut host = host(vec![level("a", FLAT, Vec2::new(24.0, 32.0))], "a");
    host.sim.continue_game();
    assert_eq!(host.steps(3).flow, FlowState::MainMenu);
}

#[test]
fn continue_restores_a_saved_checkpoint() {
    let save = SaveData::new(2, 700, PowerState::Big, "a", Vec2::new(120.0, 32.0), 1.0);
    let store = MemoryStore::with_value(SAVE_KEY, &save.encode().unwrap());
    let mut host = Host::new(Simulation::new(
        config(),
        Box::new(InMemoryLevels::new(
            "a",
            vec![level("a", FLAT, Vec2::new(24.0, 32.0))],
        )),
        Box::new(store),
    ));
    host.sim.continue_game();
    host.step_until(FlowState::Playing, 10);
    let world = host.sim.world().unwrap();
    assert_eq!(world.player().position(), Vec2::new(120.0, 32.0));
    assert_eq!(world.player().power(), PowerState::Big);
    assert_eq!(world.progress().lives, 2);
}

#[test]
fn game_over_then_confirm_returns_to_menu() {
    let pit = &["..........", "..........", "###....###"];
    let mut config = config();
    config.player.starting_lives = 1;
    let mut host = Host::new(Simulation::new(
        config,
        Box::new(InMemoryLevels::new(
            "pit",
            vec![level("pit", pit, Vec2::new(24.0, 32.0))],
        )),
        Box::new(MemoryStore::new()),
    ));
    host.sim.set_controls(ControlState {
        move_x: 1.0,
        jump_held: false,
    });
    host.sim.start_new_game();
    let snapshot = host.step_until(FlowState::GameOver, 300);
    assert_eq!(snapshot.lives, 0);

    // The screen waits for the player.
    assert_eq!(host.steps(200).flow, FlowState::GameOver);
    host.sim.confirm();
    let snapshot = host.step();
    assert_eq!(snapshot.flow, FlowState::MainMenu);
    assert!(snapshot.level.is_none());
}
