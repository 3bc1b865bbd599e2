//! Level content: the JSON descriptor and the validated, playable [`Level`].
//!
//! A level document looks like this (every field but `id` and `rows` has a
//! default):
//!
//! ```json
//! {
//!   "id": "1-1",
//!   "tile_size": 16.0,
//!   "rows": ["..........", "....==....", "##########"],
//!   "spawn": { "x": 24.0, "y": 32.0 },
//!   "enemies": [{ "kind": "Walker", "position": { "x": 120.0, "y": 32.0 } }],
//!   "pickups": [{ "kind": "Coin", "position": { "x": 72.0, "y": 14.0 } }],
//!   "checkpoints": [{ "x": 80.0, "y": 32.0 }],
//!   "goal": { "x": 144.0, "y": 0.0, "width": 16.0, "height": 32.0 },
//!   "next": "1-2"
//! }
//! ```
//!
//! Positions of entities are their feet-centre origin in world units.

use serde::{Deserialize, Serialize};
use tilestep_core::geometry::{Aabb, Vec2};
use tilestep_core::tile::TileGrid;

use crate::enemy::EnemyKind;
use crate::EngineError;

fn default_tile_size() -> f64 {
    16.0
}

// ---------------------------------------------------------------------------
// Descriptor types
// ---------------------------------------------------------------------------

/// Collectible kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PickupKind {
    /// Small becomes Big.
    Mushroom,
    /// Any power level becomes Fire.
    FireFlower,
    /// Score only.
    Coin,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnemySpawn {
    pub kind: EnemyKind,
    pub position: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PickupSpawn {
    pub kind: PickupKind,
    pub position: Vec2,
}

/// A level as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelDescriptor {
    pub id: String,
    #[serde(default = "default_tile_size")]
    pub tile_size: f64,
    /// ASCII rows: `#` solid, `=` one-way, `.` or space empty.
    pub rows: Vec<String>,
    #[serde(default)]
    pub spawn: Vec2,
    #[serde(default)]
    pub enemies: Vec<EnemySpawn>,
    #[serde(default)]
    pub pickups: Vec<PickupSpawn>,
    /// Respawn points, activated by walking past them.
    #[serde(default)]
    pub checkpoints: Vec<Vec2>,
    /// Touching this box completes the level.
    #[serde(default)]
    pub goal: Option<Aabb>,
    /// Identifier of the level that follows, if any.
    #[serde(default)]
    pub next: Option<String>,
}

impl LevelDescriptor {
    /// A bare level with the default tile size and no entities.
    pub fn new(id: impl Into<String>, rows: &[&str], spawn: Vec2) -> Self {
        Self {
            id: id.into(),
            tile_size: default_tile_size(),
            rows: rows.iter().map(|row| (*row).to_owned()).collect(),
            spawn,
            enemies: Vec::new(),
            pickups: Vec::new(),
            checkpoints: Vec::new(),
            goal: None,
            next: None,
        }
    }

    /// Parse a level document.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::LevelParse`] if the JSON does not describe a
    /// level. The layout itself is checked later by [`build`](Self::build).
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(|source| EngineError::LevelParse {
            id: peek_id(json).unwrap_or_else(|| "<unknown>".to_owned()),
            source,
        })
    }

    /// Validate the descriptor and build the tile grid.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Core`] if the rows do not form a grid and
    /// [`EngineError::InvalidLevel`] if the spawn point is outside the level
    /// or any position is not finite.
    pub fn build(&self) -> Result<Level, EngineError> {
        let grid = TileGrid::from_ascii(self.tile_size, &self.rows)?;
        let invalid = |reason: String| EngineError::InvalidLevel {
            id: self.id.clone(),
            reason,
        };

        if self.rows.is_empty() {
            return Err(invalid("level has no rows".to_owned()));
        }

        let inside = |p: Vec2| {
            p.is_finite() && p.x >= 0.0 && p.x <= grid.world_width() && p.y <= grid.world_height()
        };
        if !inside(self.spawn) {
            return Err(invalid(format!("spawn {:?} lies outside the level", self.spawn)));
        }
        for spawn in &self.enemies {
            if !inside(spawn.position) {
                return Err(invalid(format!("{:?} spawn {:?} lies outside the level", spawn.kind, spawn.position)));
            }
        }
        for pickup in &self.pickups {
            if !pickup.position.is_finite() {
                return Err(invalid(format!("{:?} has a non-finite position", pickup.kind)));
            }
        }
        if self.checkpoints.iter().any(|c| !c.is_finite()) {
            return Err(invalid("checkpoint with a non-finite position".to_owned()));
        }
        if self.goal.is_some_and(|goal| !goal.is_valid()) {
            return Err(invalid("goal box is not valid".to_owned()));
        }

        Ok(Level {
            id: self.id.clone(),
            grid,
            spawn: self.spawn,
            enemies: self.enemies.clone(),
            pickups: self.pickups.clone(),
            checkpoints: self.checkpoints.clone(),
            goal: self.goal,
            next: self.next.clone(),
        })
    }
}

/// Best-effort extraction of the `id` of a document that failed to parse.
fn peek_id(json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(json).ok()?;
    value.get("id")?.as_str().map(str::to_owned)
}

// ---------------------------------------------------------------------------
// Level
// ---------------------------------------------------------------------------

/// A validated level, ready to be played. The grid is read-only from here on.
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    pub id: String,
    pub grid: TileGrid,
    pub spawn: Vec2,
    pub enemies: Vec<EnemySpawn>,
    pub pickups: Vec<PickupSpawn>,
    pub checkpoints: Vec<Vec2>,
    pub goal: Option<Aabb>,
    pub next: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tilestep_core::tile::TileQuery;

    fn parse(doc: serde_json::Value) -> LevelDescriptor {
        LevelDescriptor::from_json_str(&doc.to_string()).unwrap()
    }

    #[test]
    fn parses_and_builds() {
        let desc = parse(json!({
            "id": "1-1",
            "rows": ["..........", "....==....", "##########"],
            "spawn": { "x": 24.0, "y": 32.0 },
            "enemies": [{ "kind": "Walker", "position": { "x": 120.0, "y": 32.0 } }],
            "pickups": [{ "kind": "Coin", "position": { "x": 72.0, "y": 14.0 } }],
            "checkpoints": [{ "x": 80.0, "y": 32.0 }],
            "goal": { "x": 144.0, "y": 0.0, "width": 16.0, "height": 32.0 },
            "next": "1-2"
        }));
        let level = desc.build().unwrap();
        assert_eq!(level.id, "1-1");
        assert_eq!(level.grid.dimensions(), (10, 3));
        assert!(level.grid.is_one_way(4, 1));
        assert_eq!(level.enemies[0].kind, EnemyKind::Walker);
        assert_eq!(level.next.as_deref(), Some("1-2"));
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let desc = parse(json!({ "id": "bare", "rows": ["...", "###"] }));
        assert_eq!(desc.tile_size, 16.0);
        assert!(desc.enemies.is_empty());
        assert!(desc.goal.is_none());
        desc.build().unwrap();
    }

    #[test]
    fn constructor_matches_parsed_document() {
        let parsed = parse(json!({
            "id": "walls",
            "rows": ["#..#", "####"],
            "spawn": { "x": 32.0, "y": 16.0 }
        }));
        let built = LevelDescriptor::new("walls", &["#..#", "####"], Vec2::new(32.0, 16.0));
        assert_eq!(parsed, built);
        assert_eq!(built.build().unwrap().grid.dimensions(), (4, 2));
    }

    #[test]
    fn parse_error_names_the_level() {
        let err = LevelDescriptor::from_json_str(r#"{ "id": "broken", "rows": 7 }"#).unwrap_err();
        assert!(err.to_string().contains("broken"), "{err}");
    }

    #[test]
    fn ragged_rows_fail_to_build() {
        let desc = parse(json!({ "id": "r", "rows": ["...", "##"] }));
        assert!(matches!(desc.build(), Err(EngineError::Core(_))));
    }

    #[test]
    fn spawn_outside_level_is_rejected() {
        let desc = parse(json!({ "id": "s", "rows": ["...", "###"], "spawn": { "x": 500.0, "y": 0.0 } }));
        let err = desc.build().unwrap_err();
        assert!(matches!(err, EngineError::InvalidLevel { .. }));
    }
}
