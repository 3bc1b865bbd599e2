//! Property tests for whole-world behaviour under arbitrary input.

use proptest::prelude::*;
use tilestep_core::collision::overlaps_solid;
use tilestep_engine::prelude::*;

const ROWS: &[&str] = &[
    "........................",
    "........................",
    ".....====.......#.......",
    "................#.......",
    "..........######........",
    "........................",
    "###########....#########",
];

fn world() -> World {
    let desc = LevelDescriptor {
        id: "prop".to_owned(),
        tile_size: 16.0,
        rows: ROWS.iter().map(|r| r.to_string()).collect(),
        spawn: Vec2::new(24.0, 96.0),
        enemies: vec![
            EnemySpawn {
                kind: EnemyKind::Walker,
                position: Vec2::new(120.0, 96.0),
            },
            EnemySpawn {
                kind: EnemyKind::Charger,
                position: Vec2::new(300.0, 96.0),
            },
        ],
        pickups: Vec::new(),
        checkpoints: Vec::new(),
        goal: None,
        next: None,
    };
    World::new(desc.build().unwrap(), SimConfig::default(), Progress::new(5))
}

#[derive(Debug, Clone)]
struct Frame {
    move_x: f64,
    jump_held: bool,
    press: Option<Action>,
}

fn frame_strategy() -> impl Strategy<Value = Frame> {
    (
        prop_oneof![Just(-1.0), Just(0.0), Just(1.0)],
        any::<bool>(),
        prop_oneof![
            6 => Just(None),
            1 => Just(Some(Action::Jump)),
            1 => Just(Some(Action::Dash)),
            1 => Just(Some(Action::Attack)),
        ],
    )
        .prop_map(|(move_x, jump_held, press)| Frame {
            move_x,
            jump_held,
            press,
        })
}

fn apply(world: &mut World, frame: &Frame) -> TickReport {
    world.set_controls(ControlState {
        move_x: frame.move_x,
        jump_held: frame.jump_held,
    });
    if let Some(action) = frame.press {
        world.push_input(InputEvent {
            action,
            timestamp: world.sim_time(),
        });
    }
    world.tick()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Two worlds fed the same inputs stay bit-identical.
    #[test]
    fn same_inputs_same_hash(frames in prop::collection::vec(frame_strategy(), 1..240)) {
        let mut a = world();
        let mut b = world();
        for frame in &frames {
            let ra = apply(&mut a, frame);
            let rb = apply(&mut b, frame);
            prop_assert_eq!(ra.events, rb.events);
        }
        prop_assert_eq!(a.state_hash(), b.state_hash());
    }

    /// The player never ends a tick inside solid tiles.
    #[test]
    fn player_never_embedded(frames in prop::collection::vec(frame_strategy(), 1..240)) {
        let mut world = world();
        for frame in &frames {
            apply(&mut world, frame);
            let aabb = world.player().aabb();
            prop_assert!(aabb.x.is_finite() && aabb.y.is_finite());
            prop_assert!(!overlaps_solid(&world.level().grid, &aabb), "player inside solid at {:?}", aabb);
        }
    }
}
