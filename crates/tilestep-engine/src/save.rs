//! Persisted progress.
//!
//! The engine produces and accepts [`SaveData`] records; where they are kept
//! is up to a [`SaveStore`]. Loading never fails loudly: a missing, malformed
//! or unknown-version record is logged and treated as "no save".
//!
//! Two record versions exist:
//!
//! - version 1 carried no timestamp and spelled the power level in lowercase
//!   (`"small"`, `"big"`, `"fire"`). These are migrated on load.
//! - version 2 is what [`SaveData::encode`] writes today.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tilestep_core::geometry::Vec2;

use crate::player::PowerState;
use crate::EngineError;

/// Key under which the engine keeps its single save slot.
pub const SAVE_KEY: &str = "tilestep.save";

// ---------------------------------------------------------------------------
// SaveData
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveData {
    pub version: u32,
    pub lives: u32,
    pub score: u64,
    pub power: PowerState,
    /// Level to resume on.
    pub level_id: String,
    /// Respawn point within that level.
    pub checkpoint: Vec2,
    /// Host timestamp (seconds) at which the record was written.
    pub timestamp: f64,
}

/// Version 1 record layout.
#[derive(Deserialize)]
struct SaveDataV1 {
    lives: u32,
    score: u64,
    power: String,
    level_id: String,
    checkpoint: Vec2,
}

impl SaveData {
    pub const VERSION: u32 = 2;

    pub fn new(
        lives: u32,
        score: u64,
        power: PowerState,
        level_id: impl Into<String>,
        checkpoint: Vec2,
        timestamp: f64,
    ) -> Self {
        Self {
            version: Self::VERSION,
            lives,
            score,
            power,
            level_id: level_id.into(),
            checkpoint,
            timestamp,
        }
    }

    /// Encode as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Encode`] if serialization fails.
    pub fn encode(&self) -> Result<String, EngineError> {
        serde_json::to_string(self).map_err(|source| EngineError::Encode {
            what: "save data",
            source,
        })
    }

    /// Decode a stored record, migrating older versions.
    ///
    /// Returns `None` for anything that is not a usable save.
    pub fn decode(text: &str) -> Option<SaveData> {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(%error, "save data is not valid JSON; ignoring it");
                return None;
            }
        };
        let version = value.get("version").and_then(serde_json::Value::as_u64);
        let decoded = match version {
            Some(2) => serde_json::from_value::<SaveData>(value).map_err(|e| e.to_string()),
            Some(1) => migrate_v1(value),
            other => {
                tracing::warn!(version = ?other, "unsupported save version; ignoring it");
                return None;
            }
        };
        match decoded {
            Ok(save) if save.checkpoint.is_finite() => Some(save),
            Ok(_) => {
                tracing::warn!("save checkpoint is not finite; ignoring it");
                None
            }
            Err(error) => {
                tracing::warn!(?version, %error, "save data is malformed; ignoring it");
                None
            }
        }
    }
}

fn migrate_v1(value: serde_json::Value) -> Result<SaveData, String> {
    let old: SaveDataV1 = serde_json::from_value(value).map_err(|e| e.to_string())?;
    let power = match old.power.as_str() {
        "small" => PowerState::Small,
        "big" => PowerState::Big,
        "fire" => PowerState::Fire,
        other => return Err(format!("unknown power level {other:?}")),
    };
    tracing::debug!(level = %old.level_id, "migrated version 1 save");
    Ok(SaveData::new(
        old.lives,
        old.score,
        power,
        old.level_id,
        old.checkpoint,
        0.0,
    ))
}

// ---------------------------------------------------------------------------
// SaveStore
// ---------------------------------------------------------------------------

/// Key-value storage for saves.
pub trait SaveStore: Send {
    /// The stored value for `key`, or `None` if there is none or it cannot be read.
    fn read(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Io`] if the value could not be stored.
    fn write(&self, key: &str, value: &str) -> Result<(), EngineError>;
}

/// Read and decode the engine's save slot.
pub fn load_save(store: &dyn SaveStore) -> Option<SaveData> {
    store.read(SAVE_KEY).and_then(|text| SaveData::decode(&text))
}

/// Encode and store `save` in the engine's save slot.
///
/// # Errors
///
/// Returns the encoding or storage error.
pub fn write_save(store: &dyn SaveStore, save: &SaveData) -> Result<(), EngineError> {
    store.write(SAVE_KEY, &save.encode()?)
}

/// Saves kept in memory for the lifetime of the store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-filled with one value.
    pub fn with_value(key: &str, value: &str) -> Self {
        let store = Self::default();
        if let Ok(mut values) = store.values.lock() {
            values.insert(key.to_owned(), value.to_owned());
        }
        store
    }
}

impl SaveStore for MemoryStore {
    fn read(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn write(&self, key: &str, value: &str) -> Result<(), EngineError> {
        let mut values = self.values.lock().map_err(|_| EngineError::Io {
            path: key.to_owned(),
            source: std::io::Error::other("memory store lock poisoned"),
        })?;
        values.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// Saves stored as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SaveStore for FileStore {
    fn read(&self, key: &str) -> Option<String> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => None,
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "could not read save");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), EngineError> {
        let path = self.path_for(key);
        let io_error = |source| EngineError::Io {
            path: path.display().to_string(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(io_error)?;
        // Write-then-rename so a crash never leaves a half-written save.
        let staging = path.with_extension("json.tmp");
        std::fs::write(&staging, value).map_err(io_error)?;
        std::fs::rename(&staging, &path).map_err(io_error)?;
        tracing::debug!(path = %path.display(), "save written");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
