//! Tile grid data and the read-only query interface the simulation uses.
//!
//! The grid is row-major with the origin at the top-left and `y` increasing
//! downward. World coordinates map to cells with `floor(coord / tile_size)`.
//!
//! Tiles come in three flavours:
//!
//! | glyph | tile        | blocks                                  |
//! |-------|-------------|-----------------------------------------|
//! | `#`   | solid       | every direction                         |
//! | `=`   | one-way     | only bodies landing on its top surface  |
//! | `.`   | empty       | nothing                                 |
//!
//! Outside the grid, columns to the left and right are solid (the level is
//! walled in) while rows above and below are empty (open sky, bottomless
//! pits).

use serde::{Deserialize, Serialize};

use crate::geometry::Vec2;
use crate::CoreError;

// ---------------------------------------------------------------------------
// Tile
// ---------------------------------------------------------------------------

/// One cell of the grid.
///
/// A tile with `one_way` set is a platform regardless of `solid`; a tile
/// blocks from every side only when it is `solid` and not `one_way`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub solid: bool,
    pub one_way: bool,
}

impl Tile {
    pub const EMPTY: Tile = Tile {
        solid: false,
        one_way: false,
    };
    pub const SOLID: Tile = Tile {
        solid: true,
        one_way: false,
    };
    pub const ONE_WAY: Tile = Tile {
        solid: false,
        one_way: true,
    };

    fn from_glyph(glyph: char) -> Option<Tile> {
        match glyph {
            '#' => Some(Tile::SOLID),
            '=' => Some(Tile::ONE_WAY),
            '.' | ' ' => Some(Tile::EMPTY),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// TileQuery
// ---------------------------------------------------------------------------

/// Read-only view of a tile grid, as consumed by the collision resolver.
///
/// Cell coordinates are signed so callers can ask about cells outside the
/// grid; implementations decide what lies there.
pub trait TileQuery {
    /// Whether the cell blocks movement from every direction.
    fn is_solid(&self, col: i64, row: i64) -> bool;

    /// Whether the cell is a one-way platform.
    fn is_one_way(&self, col: i64, row: i64) -> bool;

    /// Edge length of a (square) tile in world units.
    fn tile_size(&self) -> f64;

    /// Grid size as `(columns, rows)`.
    fn dimensions(&self) -> (usize, usize);

    /// Map a world coordinate to a cell index on either axis.
    fn world_to_cell(&self, coord: f64) -> i64 {
        (coord / self.tile_size()).floor() as i64
    }
}

// ---------------------------------------------------------------------------
// TileGrid
// ---------------------------------------------------------------------------

/// Row-major tile storage. Written by level loading, read-only while the
/// simulation runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileGrid {
    columns: usize,
    rows: usize,
    tile_size: f64,
    tiles: Vec<Tile>,
}

impl TileGrid {
    /// Build a grid from a row-major tile vector.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTileSize`] for a non-positive or non-finite
    /// tile size and [`CoreError::DimensionMismatch`] when `tiles.len()` is
    /// not `columns * rows`.
    pub fn new(
        columns: usize,
        rows: usize,
        tile_size: f64,
        tiles: Vec<Tile>,
    ) -> Result<Self, CoreError> {
        if !(tile_size > 0.0 && tile_size.is_finite()) {
            return Err(CoreError::InvalidTileSize(tile_size));
        }
        if tiles.len() != columns * rows {
            return Err(CoreError::DimensionMismatch {
                columns,
                rows,
                actual: tiles.len(),
            });
        }
        Ok(Self {
            columns,
            rows,
            tile_size,
            tiles,
        })
    }

    /// An all-empty grid.
    pub fn empty(columns: usize, rows: usize, tile_size: f64) -> Result<Self, CoreError> {
        Self::new(columns, rows, tile_size, vec![Tile::EMPTY; columns * rows])
    }

    /// Parse an ASCII picture of the level, one string per row.
    ///
    /// # Errors
    ///
    /// Fails on an invalid tile size, rows of differing width, or a glyph
    /// other than `#`, `=`, `.` and space.
    pub fn from_ascii<S: AsRef<str>>(tile_size: f64, rows: &[S]) -> Result<Self, CoreError> {
        let columns = rows.first().map(|r| r.as_ref().chars().count()).unwrap_or(0);
        let mut tiles = Vec::with_capacity(columns * rows.len());

        for (row_idx, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            let width = row.chars().count();
            if width != columns {
                return Err(CoreError::RaggedRow {
                    row: row_idx,
                    expected: columns,
                    actual: width,
                });
            }
            for (col_idx, glyph) in row.chars().enumerate() {
                let tile = Tile::from_glyph(glyph).ok_or(CoreError::UnknownGlyph {
                    glyph,
                    column: col_idx,
                    row: row_idx,
                })?;
                tiles.push(tile);
            }
        }

        Self::new(columns, rows.len(), tile_size, tiles)
    }

    /// The tile at `(col, row)`, or `None` outside the grid.
    pub fn get(&self, col: i64, row: i64) -> Option<Tile> {
        self.index(col, row).map(|i| self.tiles[i])
    }

    /// Overwrite the tile at `(col, row)`. Returns `false` outside the grid.
    pub fn set(&mut self, col: i64, row: i64, tile: Tile) -> bool {
        match self.index(col, row) {
            Some(i) => {
                self.tiles[i] = tile;
                true
            }
            None => false,
        }
    }

    /// Width of the grid in world units.
    pub fn world_width(&self) -> f64 {
        self.columns as f64 * self.tile_size
    }

    /// Height of the grid in world units.
    pub fn world_height(&self) -> f64 {
        self.rows as f64 * self.tile_size
    }

    fn index(&self, col: i64, row: i64) -> Option<usize> {
        if col < 0 || row < 0 || col as usize >= self.columns || row as usize >= self.rows {
            return None;
        }
        Some(row as usize * self.columns + col as usize)
    }

    fn column_in_bounds(&self, col: i64) -> bool {
        col >= 0 && (col as usize) < self.columns
    }
}

impl TileQuery for TileGrid {
    fn is_solid(&self, col: i64, row: i64) -> bool {
        if !self.column_in_bounds(col) {
            return true;
        }
        self.get(col, row)
            .is_some_and(|tile| tile.solid && !tile.one_way)
    }

    fn is_one_way(&self, col: i64, row: i64) -> bool {
        self.get(col, row).is_some_and(|tile| tile.one_way)
    }

    fn tile_size(&self) -> f64 {
        self.tile_size
    }

    fn dimensions(&self) -> (usize, usize) {
        (self.columns, self.rows)
    }
}

// ---------------------------------------------------------------------------
// Line of sight
// ---------------------------------------------------------------------------

/// Whether a straight segment from `from` to `to` crosses no solid tile.
///
/// Walks every cell the segment touches with a grid DDA. One-way platforms do
/// not block sight. The cell containing `from` counts: an observer embedded
/// in a wall sees nothing. Non-finite endpoints see nothing.
pub fn line_of_sight<G: TileQuery + ?Sized>(grid: &G, from: Vec2, to: Vec2) -> bool {
    if !from.is_finite() || !to.is_finite() {
        return false;
    }

    let ts = grid.tile_size();
    let mut col = grid.world_to_cell(from.x);
    let mut row = grid.world_to_cell(from.y);
    let end_col = grid.world_to_cell(to.x);
    let end_row = grid.world_to_cell(to.y);

    if grid.is_solid(col, row) {
        return false;
    }

    let dir = to - from;
    let step_col: i64 = if dir.x > 0.0 { 1 } else { -1 };
    let step_row: i64 = if dir.y > 0.0 { 1 } else { -1 };

    // Parametric distance along the segment to the next vertical/horizontal
    // cell boundary, and the distance between consecutive boundaries.
    let (mut t_max_x, t_delta_x) = if dir.x != 0.0 {
        let boundary = if dir.x > 0.0 {
            (col + 1) as f64 * ts
        } else {
            col as f64 * ts
        };
        ((boundary - from.x) / dir.x, ts / dir.x.abs())
    } else {
        (f64::INFINITY, f64::INFINITY)
    };
    let (mut t_max_y, t_delta_y) = if dir.y != 0.0 {
        let boundary = if dir.y > 0.0 {
            (row + 1) as f64 * ts
        } else {
            row as f64 * ts
        };
        ((boundary - from.y) / dir.y, ts / dir.y.abs())
    } else {
        (f64::INFINITY, f64::INFINITY)
    };

    let max_steps = (end_col - col).unsigned_abs() + (end_row - row).unsigned_abs() + 1;
    for _ in 0..max_steps {
        if col == end_col && row == end_row {
            return true;
        }
        if t_max_x < t_max_y {
            if t_max_x > 1.0 {
                return true;
            }
            col += step_col;
            t_max_x += t_delta_x;
        } else {
            if t_max_y > 1.0 {
                return true;
            }
            row += step_row;
            t_max_y += t_delta_y;
        }
        if grid.is_solid(col, row) {
            return false;
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
