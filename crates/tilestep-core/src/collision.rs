//! Swept, axis-separated AABB vs tile-grid collision resolution.
//!
//! [`resolve`] moves a box by `velocity * dt` through a [`TileQuery`] and
//! returns where it ends up, what is left of its velocity, and which sides
//! touched something.
//!
//! # Algorithm
//!
//! 1. **Depenetration.** If the box already overlaps solid tiles (a bad level
//!    edit, a spawn inside a wall), it is pushed out along the shortest of
//!    up / left / right / down, ties broken in that order. Each direction
//!    keeps pushing past solid runs until the box is clear or has crossed the
//!    whole grid. If no direction clears it, the box is reported `stuck` and
//!    left where it was with zero velocity.
//! 2. **X pass.** The horizontal motion is swept on its own: every column
//!    between the leading edge and its target is checked, nearest first, and
//!    the box is snapped flush against the first blocking one.
//! 3. **Y pass.** The same for vertical motion, starting from the corrected
//!    X position. Moving down, one-way platforms block too (the column scan
//!    only ever sees platforms whose top is at or below the leading edge, so
//!    the box came from above). Moving up or sideways they never block.
//!
//! Each pass is split into sub-steps no longer than one tile, so the
//! guarantee "nothing is skipped" never depends on the speed of the body.
//!
//! Edges are compared with a small [`EPSILON`]: boxes flush against a tile
//! touch it but do not overlap it.

use serde::{Deserialize, Serialize};

use crate::geometry::{Aabb, Vec2};
use crate::tile::TileQuery;

/// Tolerance used for edge comparisons, in world units.
pub const EPSILON: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Contacts / Resolution
// ---------------------------------------------------------------------------

/// Which sides of the box touched a blocking tile during resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contacts {
    pub top: bool,
    pub bottom: bool,
    pub left: bool,
    pub right: bool,
}

impl Contacts {
    pub fn any(&self) -> bool {
        self.top || self.bottom || self.left || self.right
    }
}

/// Output of [`resolve`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    /// The corrected box.
    pub aabb: Aabb,
    /// The corrected velocity (blocked components zeroed).
    pub velocity: Vec2,
    pub contacts: Contacts,
    /// The box started embedded in solid tiles and could not be freed, or
    /// its inputs were not finite. Position and velocity are not trusted.
    pub stuck: bool,
    /// The box started embedded and was pushed out before moving.
    pub depenetrated: bool,
}

impl Resolution {
    /// Corrected top-left position.
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.aabb.x, self.aabb.y)
    }
}

// ---------------------------------------------------------------------------
// Axis helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Push {
    Up,
    Left,
    Right,
    Down,
}

const PUSH_ORDER: [Push; 4] = [Push::Up, Push::Left, Push::Right, Push::Down];

/// Inclusive range of cells a `[min, max]` interval strictly overlaps.
fn cell_span(min: f64, max: f64, tile_size: f64) -> (i64, i64) {
    let first = ((min + EPSILON) / tile_size).floor() as i64;
    let last = ((max - EPSILON) / tile_size).ceil() as i64 - 1;
    (first, last)
}

fn rows_of(aabb: &Aabb, tile_size: f64) -> (i64, i64) {
    cell_span(aabb.top(), aabb.bottom(), tile_size)
}

fn columns_of(aabb: &Aabb, tile_size: f64) -> (i64, i64) {
    cell_span(aabb.left(), aabb.right(), tile_size)
}

/// Whether the box overlaps any tile that blocks from every side.
///
/// One-way platforms never count: a body can stand inside one's row while
/// jumping up through it.
pub fn overlaps_solid<G: TileQuery + ?Sized>(grid: &G, aabb: &Aabb) -> bool {
    solid_cell_bounds(grid, aabb).is_some()
}

/// Bounding cell range `(min_col, max_col, min_row, max_row)` of the solid
/// tiles the box overlaps, or `None` when it overlaps none.
fn solid_cell_bounds<G: TileQuery + ?Sized>(grid: &G, aabb: &Aabb) -> Option<(i64, i64, i64, i64)> {
    let ts = grid.tile_size();
    let (c0, c1) = columns_of(aabb, ts);
    let (r0, r1) = rows_of(aabb, ts);
    let mut bounds: Option<(i64, i64, i64, i64)> = None;
    for row in r0..=r1 {
        for col in c0..=c1 {
            if grid.is_solid(col, row) {
                bounds = Some(match bounds {
                    None => (col, col, row, row),
                    Some((a, b, c, d)) => (a.min(col), b.max(col), c.min(row), d.max(row)),
                });
            }
        }
    }
    bounds
}

/// Find the first blocking cell line crossed when moving `aabb` by `step`
/// along `axis`. Returns the snapped min-edge coordinate on that axis.
fn first_obstacle<G: TileQuery + ?Sized>(grid: &G, aabb: &Aabb, axis: Axis, step: f64) -> Option<f64> {
    let ts = grid.tile_size();

    // Cross-axis span of cells the box covers while sliding.
    let (cross0, cross1) = match axis {
        Axis::X => rows_of(aabb, ts),
        Axis::Y => columns_of(aabb, ts),
    };

    let blocks = |line: i64, cross: i64| -> bool {
        match axis {
            Axis::X => grid.is_solid(line, cross),
            // Only landing on a one-way platform is blocked.
            Axis::Y if step > 0.0 => grid.is_solid(cross, line) || grid.is_one_way(cross, line),
            Axis::Y => grid.is_solid(cross, line),
        }
    };
    let line_blocked = |line: i64| (cross0..=cross1).any(|cross| blocks(line, cross));

    let (min_edge, size) = match axis {
        Axis::X => (aabb.left(), aabb.width),
        Axis::Y => (aabb.top(), aabb.height),
    };

    if step > 0.0 {
        let lead = min_edge + size;
        let target = lead + step;
        let first = ((lead - EPSILON) / ts).ceil() as i64;
        let last = ((target - EPSILON) / ts).ceil() as i64 - 1;
        (first..=last)
            .find(|&line| line_blocked(line))
            .map(|line| line as f64 * ts - size)
    } else {
        let lead = min_edge;
        let target = lead + step;
        let first = ((lead + EPSILON) / ts).floor() as i64 - 1;
        let last = ((target + EPSILON) / ts).floor() as i64;
        (last..=first)
            .rev()
            .find(|&line| line_blocked(line))
            .map(|line| (line + 1) as f64 * ts)
    }
}

/// Sweep `aabb` by `delta` along `axis` in sub-steps of at most one tile.
///
/// Returns the final min-edge coordinate and whether the motion was blocked.
fn sweep_axis<G: TileQuery + ?Sized>(grid: &G, aabb: &Aabb, axis: Axis, delta: f64) -> (f64, bool) {
    let ts = grid.tile_size();
    let sub_steps = ((delta.abs() / ts).ceil() as usize).max(1);
    let step = delta / sub_steps as f64;

    let mut current = *aabb;
    for _ in 0..sub_steps {
        if let Some(snapped) = first_obstacle(grid, &current, axis, step) {
            return (snapped, true);
        }
        match axis {
            Axis::X => current.x += step,
            Axis::Y => current.y += step,
        }
    }
    match axis {
        Axis::X => (current.x, false),
        Axis::Y => (current.y, false),
    }
}

/// Try to free an embedded box by pushing it in one direction.
fn push_out<G: TileQuery + ?Sized>(grid: &G, aabb: &Aabb, push: Push) -> Option<Aabb> {
    let ts = grid.tile_size();
    // Every push clears at least one row or column, so this covers the grid.
    let (columns, rows) = grid.dimensions();
    let limit = columns + rows + 2;
    let mut candidate = *aabb;
    for _ in 0..limit {
        let Some((c0, c1, r0, r1)) = solid_cell_bounds(grid, &candidate) else {
            return Some(candidate);
        };
        match push {
            Push::Up => candidate.y = r0 as f64 * ts - candidate.height,
            Push::Down => candidate.y = (r1 + 1) as f64 * ts,
            Push::Left => candidate.x = c0 as f64 * ts - candidate.width,
            Push::Right => candidate.x = (c1 + 1) as f64 * ts,
        }
    }
    if overlaps_solid(grid, &candidate) {
        None
    } else {
        Some(candidate)
    }
}

/// Shortest deterministic way out of solid tiles, if any.
fn depenetrate<G: TileQuery + ?Sized>(grid: &G, aabb: &Aabb) -> Option<(Aabb, Push)> {
    let mut best: Option<(Aabb, Push, f64)> = None;
    for push in PUSH_ORDER {
        if let Some(freed) = push_out(grid, aabb, push) {
            let distance = (freed.x - aabb.x).abs() + (freed.y - aabb.y).abs();
            // Strictly shorter wins, so ties keep the earlier direction.
            if best.as_ref().map_or(true, |(_, _, d)| distance < *d) {
                best = Some((freed, push, distance));
            }
        }
    }
    best.map(|(freed, push, _)| (freed, push))
}

/// Whether the box rests flush on top of a solid tile or one-way platform.
fn resting_on_ground<G: TileQuery + ?Sized>(grid: &G, aabb: &Aabb) -> bool {
    let ts = grid.tile_size();
    let bottom = aabb.bottom();
    let row = (bottom / ts).round();
    if (row * ts - bottom).abs() > EPSILON {
        return false;
    }
    let row = row as i64;
    let (c0, c1) = columns_of(aabb, ts);
    (c0..=c1).any(|col| grid.is_solid(col, row) || grid.is_one_way(col, row))
}

// ---------------------------------------------------------------------------
// resolve
// ---------------------------------------------------------------------------

/// Move `aabb` by `velocity * dt` through `grid`, X axis first, then Y.
///
/// Blocked velocity components are zeroed and the matching contact flag is
/// set. A box at rest flush on the ground (no vertical motion) still reports
/// a bottom contact.
pub fn resolve<G: TileQuery + ?Sized>(aabb: &Aabb, velocity: Vec2, grid: &G, dt: f64) -> Resolution {
    let mut res = Resolution {
        aabb: *aabb,
        velocity,
        contacts: Contacts::default(),
        stuck: false,
        depenetrated: false,
    };

    if !aabb.is_valid() || !velocity.is_finite() || !(dt.is_finite() && dt >= 0.0) {
        tracing::warn!(?aabb, ?velocity, dt, "non-finite collision input, reporting stuck");
        res.velocity = Vec2::ZERO;
        res.stuck = true;
        return res;
    }

    if overlaps_solid(grid, &res.aabb) {
        match depenetrate(grid, &res.aabb) {
            Some((freed, push)) => {
                tracing::warn!(from = ?aabb, to = ?freed, ?push, "box embedded in solid tiles, pushed out");
                res.aabb = freed;
                res.depenetrated = true;
                match push {
                    Push::Up => {
                        res.contacts.bottom = true;
                        res.velocity.y = res.velocity.y.min(0.0);
                    }
                    Push::Down => {
                        res.contacts.top = true;
                        res.velocity.y = res.velocity.y.max(0.0);
                    }
                    Push::Left => {
                        res.contacts.right = true;
                        res.velocity.x = res.velocity.x.min(0.0);
                    }
                    Push::Right => {
                        res.contacts.left = true;
                        res.velocity.x = res.velocity.x.max(0.0);
                    }
                }
            }
            None => {
                tracing::warn!(?aabb, "box embedded in solid tiles with no way out");
                res.velocity = Vec2::ZERO;
                res.stuck = true;
                return res;
            }
        }
    }

    // X pass: horizontal motion only.
    let dx = res.velocity.x * dt;
    if dx != 0.0 {
        let (x, blocked) = sweep_axis(grid, &res.aabb, Axis::X, dx);
        res.aabb.x = x;
        if blocked {
            res.velocity.x = 0.0;
            if dx > 0.0 {
                res.contacts.right = true;
            } else {
                res.contacts.left = true;
            }
        }
    }

    // Y pass: vertical motion from the corrected X position.
    let dy = res.velocity.y * dt;
    if dy != 0.0 {
        let (y, blocked) = sweep_axis(grid, &res.aabb, Axis::Y, dy);
        res.aabb.y = y;
        if blocked {
            res.velocity.y = 0.0;
            if dy > 0.0 {
                res.contacts.bottom = true;
            } else {
                res.contacts.top = true;
            }
        }
    }

    if !res.contacts.bottom && res.velocity.y == 0.0 && resting_on_ground(grid, &res.aabb) {
        res.contacts.bottom = true;
    }

    res
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
