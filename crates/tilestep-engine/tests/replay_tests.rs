//! Integration tests for replay recording, verification and divergence
//! detection.

use tilestep_engine::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn level() -> LevelDescriptor {
    let mut desc = LevelDescriptor::new(
        "replay",
        &[
            "....................",
            "....................",
            "..........====......",
            "....................",
            "####################",
        ],
        Vec2::new(24.0, 40.0),
    );
    desc.enemies.push(EnemySpawn {
        kind: EnemyKind::Charger,
        position: Vec2::new(260.0, 64.0),
    });
    desc.pickups.push(PickupSpawn {
        kind: PickupKind::Coin,
        position: Vec2::new(80.0, 64.0),
    });
    desc
}

/// A short scripted run: walk, jump, dash, turn around.
fn script(tick: u64) -> (ControlState, Vec<Action>) {
    let move_x = if tick < 80 { 1.0 } else { -1.0 };
    let presses = match tick {
        10 | 55 => vec![Action::Jump],
        30 => vec![Action::Dash],
        90 => vec![Action::Jump, Action::Dash],
        _ => Vec::new(),
    };
    (
        ControlState {
            move_x,
            jump_held: (10..20).contains(&tick),
        },
        presses,
    )
}

/// Play the script for `ticks` ticks and record it.
fn record(config: SimConfig, ticks: u64, interval: u64) -> (ReplayLog, String) {
    let desc = level();
    let progress = Progress::new(3);
    let mut world = World::new(desc.build().unwrap(), config.clone(), progress.clone());
    let mut recorder = ReplayRecorder::new(desc, config, progress, interval);

    for tick in 0..ticks {
        let (controls, presses) = script(tick);
        world.set_controls(controls);
        for action in presses {
            world.push_input(InputEvent {
                action,
                timestamp: world.sim_time(),
            });
        }
        let hash = world.state_hash();
        let report = world.tick();
        recorder.record_tick(report.tick, report.controls, &report.presses, Some(hash));
    }
    (recorder.finish(), world.state_hash())
}

// ---------------------------------------------------------------------------
// Matching replays
// ---------------------------------------------------------------------------

#[test]
fn replay_of_recorded_run_matches() {
    let (log, final_hash) = record(SimConfig::default(), 120, 10);
    assert_eq!(log.total_ticks, 120);

    let result = replay(&log).unwrap();
    assert!(result.completed);
    assert_eq!(result.ticks_replayed, 120);
    assert!(result.first_divergence.is_none());
    assert_eq!(result.final_hash, final_hash);
}

#[test]
fn log_only_records_changes() {
    let (log, _) = record(SimConfig::default(), 120, 0);
    let inputs = log
        .entries
        .iter()
        .filter(|e| matches!(e, ReplayEntry::Input { .. }))
        .count();
    let checkpoints = log
        .entries
        .iter()
        .filter(|e| matches!(e, ReplayEntry::Checkpoint { .. }))
        .count();
    assert_eq!(checkpoints, 120, "interval 0 checkpoints every tick");
    assert!(inputs < 12, "expected a handful of input entries, got {inputs}");
}

#[test]
fn replay_survives_json_round_trip() {
    let (log, final_hash) = record(SimConfig::default(), 100, 5);
    let json = serde_json::to_string(&log).unwrap();
    let restored: ReplayLog = serde_json::from_str(&json).unwrap();

    let result = replay(&restored).unwrap();
    assert!(result.completed);
    assert_eq!(result.final_hash, final_hash);
}

#[test]
fn empty_log_replays_nothing() {
    let (log, _) = record(SimConfig::default(), 0, 10);
    let result = replay(&log).unwrap();
    assert!(result.completed);
    assert_eq!(result.ticks_replayed, 0);
}

// ---------------------------------------------------------------------------
// Divergence
// ---------------------------------------------------------------------------

#[test]
fn tampered_checkpoint_is_reported() {
    let (mut log, _) = record(SimConfig::default(), 60, 10);
    for entry in &mut log.entries {
        if let ReplayEntry::Checkpoint { tick: 30, state_hash } = entry {
            *state_hash = "0".repeat(64);
        }
    }

    let result = replay(&log).unwrap();
    assert!(!result.completed);
    assert_eq!(result.ticks_replayed, 30);
    let divergence = result.first_divergence.unwrap();
    assert_eq!(divergence.tick, 30);
    assert_eq!(divergence.expected_hash, "0".repeat(64));
    assert_eq!(divergence.actual_hash, result.final_hash);
}

#[test]
fn different_physics_diverges() {
    let (mut log, _) = record(SimConfig::default(), 60, 10);
    log.config.physics.gravity = 900.0;

    let result = replay(&log).unwrap();
    assert!(!result.completed);
    // Tick 0 is hashed before anything moves; the first later checkpoint
    // catches the difference.
    assert_eq!(result.first_divergence.unwrap().tick, 10);
}

#[test]
fn dropped_press_diverges() {
    let (mut log, _) = record(SimConfig::default(), 60, 10);
    for entry in &mut log.entries {
        if let ReplayEntry::Input { tick: 30, presses, .. } = entry {
            presses.clear();
        }
    }
    let result = replay(&log).unwrap();
    assert!(!result.completed);
    assert_eq!(result.first_divergence.unwrap().tick, 40);
}

// ---------------------------------------------------------------------------
// Malformed logs
// ---------------------------------------------------------------------------

#[test]
fn duplicate_checkpoint_is_an_error() {
    let (mut log, _) = record(SimConfig::default(), 20, 10);
    log.entries.push(ReplayEntry::Checkpoint {
        tick: 10,
        state_hash: "x".to_owned(),
    });
    let error = replay(&log).unwrap_err();
    assert!(error.to_string().contains("duplicate Checkpoint"));
}

#[test]
fn duplicate_input_is_an_error() {
    let (mut log, _) = record(SimConfig::default(), 20, 10);
    log.entries.push(ReplayEntry::Input {
        tick: 10,
        controls: ControlState::default(),
        presses: Vec::new(),
    });
    let error = replay(&log).unwrap_err();
    assert!(error.to_string().contains("duplicate Input"));
}

#[test]
fn invalid_level_is_an_error() {
    let (mut log, _) = record(SimConfig::default(), 20, 10);
    log.level.rows.push("#".to_owned());
    assert!(replay(&log).is_err());
}

#[test]
fn invalid_config_is_an_error() {
    let (mut log, _) = record(SimConfig::default(), 20, 10);
    log.config.clock.fixed_step = 0.0;
    assert!(replay(&log).is_err());
}

#[test]
#[should_panic(expected = "is not after previous tick")]
fn recorder_rejects_repeated_ticks() {
    let mut recorder = ReplayRecorder::new(level(), SimConfig::default(), Progress::new(3), 10);
    recorder.record_tick(5, ControlState::default(), &[], None);
    recorder.record_tick(5, ControlState::default(), &[], None);
}
