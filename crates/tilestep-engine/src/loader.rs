//! Level sources and non-blocking level loading.
//!
//! The game-flow `Loading` state asks a [`LevelSource`] for a level and gets a
//! [`PendingLoad`] back immediately. The flow machine polls it once per tick
//! and never blocks: [`PendingLoad::poll`] uses `try_recv` on a channel that a
//! worker thread (or the source itself, for in-memory content) fills in.
//!
//! Dropping a `PendingLoad` abandons the load. The worker's send then fails
//! and its result is discarded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};

use crate::level::LevelDescriptor;
use crate::EngineError;

// ---------------------------------------------------------------------------
// PendingLoad
// ---------------------------------------------------------------------------

/// State of an in-flight load.
#[derive(Debug)]
pub enum LoadPoll<T> {
    Pending,
    Ready(T),
    Failed(EngineError),
}

/// Receiving end of an asynchronous load.
#[derive(Debug)]
pub struct PendingLoad<T> {
    label: String,
    receiver: Receiver<Result<T, EngineError>>,
    finished: bool,
}

impl<T> PendingLoad<T> {
    /// Create a load and the sender its producer delivers the result through.
    pub fn channel(label: impl Into<String>) -> (mpsc::Sender<Result<T, EngineError>>, Self) {
        let (sender, receiver) = mpsc::channel();
        let load = Self {
            label: label.into(),
            receiver,
            finished: false,
        };
        (sender, load)
    }

    /// A load that has already completed.
    pub fn ready(label: impl Into<String>, value: T) -> Self {
        Self::resolved(label, Ok(value))
    }

    /// A load that has already failed.
    pub fn failed(label: impl Into<String>, error: EngineError) -> Self {
        Self::resolved(label, Err(error))
    }

    fn resolved(label: impl Into<String>, result: Result<T, EngineError>) -> Self {
        let (sender, load) = Self::channel(label);
        // The receiver is alive in `load`, so the send cannot fail.
        let _ = sender.send(result);
        load
    }

    /// What is being loaded (the level identifier).
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Check for a result without blocking.
    ///
    /// Returns `Ready` or `Failed` exactly once; later polls report
    /// `Failed(LoadDisconnected)`.
    pub fn poll(&mut self) -> LoadPoll<T> {
        if self.finished {
            return LoadPoll::Failed(EngineError::LoadDisconnected(self.label.clone()));
        }
        match self.receiver.try_recv() {
            Ok(Ok(value)) => {
                self.finished = true;
                LoadPoll::Ready(value)
            }
            Ok(Err(error)) => {
                self.finished = true;
                LoadPoll::Failed(error)
            }
            Err(TryRecvError::Empty) => LoadPoll::Pending,
            Err(TryRecvError::Disconnected) => {
                self.finished = true;
                LoadPoll::Failed(EngineError::LoadDisconnected(self.label.clone()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// LevelSource
// ---------------------------------------------------------------------------

/// Where levels come from.
pub trait LevelSource: Send {
    /// Start loading the level `id`. Must return without blocking.
    fn request(&self, id: &str) -> PendingLoad<LevelDescriptor>;

    /// Identifier of the level a new game starts on.
    fn first_level(&self) -> &str;
}

/// Levels held in memory. Requests resolve immediately.
#[derive(Debug, Clone)]
pub struct InMemoryLevels {
    first: String,
    levels: HashMap<String, LevelDescriptor>,
}

impl InMemoryLevels {
    pub fn new(first: impl Into<String>, levels: Vec<LevelDescriptor>) -> Self {
        Self {
            first: first.into(),
            levels: levels
                .into_iter()
                .map(|level| (level.id.clone(), level))
                .collect(),
        }
    }

    pub fn insert(&mut self, level: LevelDescriptor) {
        self.levels.insert(level.id.clone(), level);
    }
}

impl LevelSource for InMemoryLevels {
    fn request(&self, id: &str) -> PendingLoad<LevelDescriptor> {
        match self.levels.get(id) {
            Some(level) => PendingLoad::ready(id, level.clone()),
            None => PendingLoad::failed(id, EngineError::LevelNotFound(id.to_owned())),
        }
    }

    fn first_level(&self) -> &str {
        &self.first
    }
}

/// Levels stored as `<dir>/<id>.json`, read and parsed on a worker thread.
#[derive(Debug, Clone)]
pub struct DirectoryLevels {
    dir: PathBuf,
    first: String,
}

impl DirectoryLevels {
    pub fn new(dir: impl Into<PathBuf>, first: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            first: first.into(),
        }
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl LevelSource for DirectoryLevels {
    fn request(&self, id: &str) -> PendingLoad<LevelDescriptor> {
        let (sender, load) = PendingLoad::channel(id);
        let path = self.path_for(id);
        let id = id.to_owned();
        std::thread::spawn(move || {
            let result = read_level(&path, &id);
            if sender.send(result).is_err() {
                tracing::debug!(level = %id, "level load abandoned");
            }
        });
        load
    }

    fn first_level(&self) -> &str {
        &self.first
    }
}

fn read_level(path: &Path, id: &str) -> Result<LevelDescriptor, EngineError> {
    let text = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            EngineError::LevelNotFound(id.to_owned())
        } else {
            EngineError::Io {
                path: path.display().to_string(),
                source,
            }
        }
    })?;
    let level = LevelDescriptor::from_json_str(&text)?;
    tracing::debug!(level = %level.id, path = %path.display(), "level read");
    Ok(level)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
