//! Property tests for the simulation building blocks.
//!
//! These tests use `proptest` to generate random frame deltas, tile layouts,
//! press timings and transition sequences, and verify that the invariants of
//! each component hold for all of them.

use proptest::prelude::*;
use tilestep_core::collision::overlaps_solid;
use tilestep_core::prelude::*;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Raw frame deltas: mostly plausible frames, sometimes stalls or garbage.
fn raw_delta() -> impl Strategy<Value = f64> {
    prop_oneof![
        8 => 0.0..0.05f64,
        2 => 0.05..30.0f64,
        1 => Just(-1.0),
        1 => Just(f64::NAN),
        1 => Just(f64::INFINITY),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    /// No single advance emits more than the clamp allows, and the
    /// accumulator always ends in `[0, fixed_step)`.
    #[test]
    fn clock_ticks_are_bounded(
        step_hz in 20u32..240,
        deltas in prop::collection::vec(raw_delta(), 1..100),
    ) {
        let mut clock = Clock::new(ClockConfig {
            fixed_step: 1.0 / f64::from(step_hz),
            max_step_clamp: 0.25,
        });
        let bound = clock.max_ticks_per_advance();
        let mut total = 0u64;

        for delta in deltas {
            let advance = clock.advance(delta);
            prop_assert!(advance.ticks <= bound, "{} ticks > bound {}", advance.ticks, bound);
            prop_assert!(clock.accumulator() >= 0.0);
            prop_assert!(clock.accumulator() < clock.fixed_step());
            prop_assert!((0.0..1.0).contains(&advance.alpha));
            total += u64::from(advance.ticks);
        }
        prop_assert_eq!(clock.tick_count(), total);
    }
}

// ---------------------------------------------------------------------------
// Physics
// ---------------------------------------------------------------------------

/// Floating-point slack for comparing positions integrated at two rates.
const FP_TOLERANCE: f64 = 1e-6;

proptest! {
    /// Halving the tick rate over the same elapsed time reaches the same
    /// velocity. Semi-implicit Euler leads the exact position by `a * T * dt / 2`
    /// under constant acceleration, so the tolerance between the two rates is
    /// `a * T * (1/30 - 1/60) / 2` plus floating-point slack, and the measured
    /// gap must equal that bias.
    #[test]
    fn integration_matches_across_rates_within_step_bias(
        v0 in -500.0..500.0f64,
        vx in -300.0..300.0f64,
        gravity in 0.0..2000.0f64,
        half_ticks in 1usize..120,
    ) {
        let config = PhysicsConfig {
            gravity,
            max_fall_speed: f64::MAX,
            ..Default::default()
        };

        let run = |ticks: usize, dt: f64| {
            let mut body = PhysicsBody::default();
            body.set_velocity(Vec2::new(vx, v0));
            let mut position = Vec2::ZERO;
            for _ in 0..ticks {
                position = position + body.integrate(dt, &config);
            }
            (position, body.velocity())
        };

        let (p60, v60) = run(half_ticks * 2, 1.0 / 60.0);
        let (p30, v30) = run(half_ticks, 1.0 / 30.0);
        let elapsed = half_ticks as f64 / 30.0;

        prop_assert!((v60.y - v30.y).abs() < FP_TOLERANCE);
        prop_assert!((p60.x - p30.x).abs() < FP_TOLERANCE);
        let bias = gravity * elapsed * (1.0 / 30.0 - 1.0 / 60.0) / 2.0;
        prop_assert!((p30.y - p60.y).abs() <= bias + FP_TOLERANCE);
        prop_assert!(((p30.y - p60.y) - bias).abs() < FP_TOLERANCE, "bias {} vs {}", p30.y - p60.y, bias);
    }

    /// Without acceleration both rates land on the same position.
    #[test]
    fn integration_without_acceleration_matches_exactly(
        vx in -300.0..300.0f64,
        vy in -500.0..500.0f64,
        half_ticks in 1usize..120,
    ) {
        let config = PhysicsConfig {
            gravity: 0.0,
            ..Default::default()
        };
        let run = |ticks: usize, dt: f64| {
            let mut body = PhysicsBody::default();
            body.set_velocity(Vec2::new(vx, vy));
            let mut position = Vec2::ZERO;
            for _ in 0..ticks {
                position = position + body.integrate(dt, &config);
            }
            position
        };

        let p60 = run(half_ticks * 2, 1.0 / 60.0);
        let p30 = run(half_ticks, 1.0 / 30.0);
        prop_assert!((p60.x - p30.x).abs() < FP_TOLERANCE);
        prop_assert!((p60.y - p30.y).abs() < FP_TOLERANCE);
    }
}

// ---------------------------------------------------------------------------
// Collision
// ---------------------------------------------------------------------------

const COLUMNS: usize = 10;
const ROWS: usize = 10;
const TILE: f64 = 16.0;

fn tile_strategy() -> impl Strategy<Value = Tile> {
    prop_oneof![
        6 => Just(Tile::EMPTY),
        3 => Just(Tile::SOLID),
        1 => Just(Tile::ONE_WAY),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(4_000))]

    /// A box that starts clear of solid tiles never ends a resolve inside one,
    /// whatever its size or speed.
    #[test]
    fn resolved_box_never_overlaps_solid(
        tiles in prop::collection::vec(tile_strategy(), COLUMNS * ROWS),
        width in 2.0..30.0f64,
        height in 2.0..30.0f64,
        fx in 0.0..1.0f64,
        fy in -0.5..1.2f64,
        vx in -4000.0..4000.0f64,
        vy in -4000.0..4000.0f64,
    ) {
        let mut grid = TileGrid::new(COLUMNS, ROWS, TILE, tiles).unwrap();
        let x = fx * (grid.world_width() - width);
        let y = fy * grid.world_height();
        let start = Aabb::new(x, y, width, height);

        // Carve out the starting area so the box begins in free space.
        let first_col = grid.world_to_cell(start.left());
        let last_col = grid.world_to_cell(start.right());
        let first_row = grid.world_to_cell(start.top());
        let last_row = grid.world_to_cell(start.bottom());
        for row in first_row..=last_row {
            for col in first_col..=last_col {
                grid.set(col, row, Tile::EMPTY);
            }
        }
        prop_assume!(!overlaps_solid(&grid, &start));

        let res = resolve(&start, Vec2::new(vx, vy), &grid, 1.0 / 60.0);
        prop_assert!(!res.stuck);
        prop_assert!(res.aabb.is_valid());
        prop_assert!(res.velocity.is_finite());
        prop_assert!(!overlaps_solid(&grid, &res.aabb), "{:?} -> {:?}", start, res.aabb);
    }

    /// Falling at any speed onto a one-tile floor always lands on top of it.
    #[test]
    fn falling_never_tunnels(
        speed in 300.0..50_000.0f64,
        x in 0.0..100.0f64,
    ) {
        let mut rows = vec![".........."; 8];
        rows.push("##########");
        rows.extend(vec![".........."; 8]);
        let grid = TileGrid::from_ascii(TILE, &rows).unwrap();

        let mut aabb = Aabb::new(x, 0.0, 12.0, 12.0);
        let mut velocity = Vec2::new(0.0, speed);
        for _ in 0..600 {
            let res = resolve(&aabb, velocity, &grid, 1.0 / 60.0);
            aabb = res.aabb;
            velocity = res.velocity;
            if res.contacts.bottom {
                break;
            }
        }
        prop_assert_eq!(aabb.bottom(), 8.0 * TILE);
    }
}

// ---------------------------------------------------------------------------
// Input buffer
// ---------------------------------------------------------------------------

proptest! {
    /// A press is consumable exactly once, and only while younger than the
    /// window. Times are multiples of 1/1024 s so ages are exact.
    #[test]
    fn buffered_press_expires_and_consumes_once(
        pressed_at in 0u32..100_000,
        age in 0u32..400,
    ) {
        let window = InputConfig::default().buffer_window;
        let mut buffer = InputBuffer::new(window);
        let pressed_at = f64::from(pressed_at) / 1024.0;
        let now = pressed_at + f64::from(age) / 1024.0;

        buffer.record(Action::Jump, pressed_at);
        let fresh = f64::from(age) / 1024.0 < window;
        prop_assert_eq!(buffer.try_consume(Action::Jump, now), fresh);
        prop_assert!(!buffer.try_consume(Action::Jump, now));

        buffer.sweep(now);
        prop_assert!(buffer.is_empty());
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Phase {
    A,
    B,
    C,
}

fn phase_strategy() -> impl Strategy<Value = Phase> {
    prop_oneof![Just(Phase::A), Just(Phase::B), Just(Phase::C)]
}

fn phases() -> StateMachine<Phase, Vec<char>> {
    let handlers = StateHandlers::new()
        .on_enter(|log: &mut Vec<char>| log.push('>'))
        .on_exit(|log: &mut Vec<char>| log.push('<'));
    let mut machine = StateMachine::new("phases", Phase::A);
    machine
        .register(Phase::A, handlers)
        .register(Phase::B, handlers)
        .register(Phase::C, handlers);
    machine
}

proptest! {
    /// Enter and exit events alternate strictly, starting with the initial
    /// enter, for any sequence of plain and forced transitions.
    #[test]
    fn enter_and_exit_alternate(
        requests in prop::collection::vec((phase_strategy(), any::<bool>()), 0..60),
    ) {
        let mut log = Vec::new();
        let mut machine = phases();
        machine.start(&mut log);

        for (target, forced) in requests {
            let before = machine.current();
            let outcome = if forced {
                machine.force_transition(target, &mut log)
            } else {
                machine.transition(target, &mut log)
            };
            prop_assert_eq!(outcome.changed(), forced || before != target);
            prop_assert_eq!(machine.current(), target);
            prop_assert_eq!(machine.enter_count(), machine.exit_count() + 1);
        }

        for (i, event) in log.iter().enumerate() {
            let expected = if i % 2 == 0 { '>' } else { '<' };
            prop_assert_eq!(*event, expected);
        }
    }
}
