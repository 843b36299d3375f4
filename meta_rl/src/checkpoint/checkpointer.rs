//! Per-iteration snapshot persistence.
//!
//! The trainer hands one JSON snapshot per outer iteration to a
//! [`SnapshotStore`]. [`Checkpointer`] writes them to a directory according to
//! a [`SnapshotMode`] and can report the last iteration on disk so a crashed
//! run can resume with `start_itr = latest + 1`.

use serde_json::Value;
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Which iterations are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotMode {
    /// Every iteration to `itr_{itr}.json`
    All,
    /// Only the most recent iteration, overwriting `params.json`
    Last,
    /// Every `n`-th iteration to `itr_{itr}.json`
    Gap(usize),
    /// Nothing is written
    None,
}

/// Configuration for the checkpointer.
#[derive(Debug, Clone)]
pub struct CheckpointerConfig {
    /// Directory to store snapshots.
    pub checkpoint_dir: PathBuf,
    pub mode: SnapshotMode,
}

impl Default for CheckpointerConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("./checkpoints"),
            mode: SnapshotMode::Last,
        }
    }
}

impl CheckpointerConfig {
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: SnapshotMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Error type for checkpointing operations.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("snapshot serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("no checkpoints found")]
    NoCheckpoints,
    #[error("snapshot gap must be positive")]
    InvalidGap,
}

/// Snapshot written for one iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointInfo {
    pub path: PathBuf,
    pub itr: usize,
}

/// Receives the per-iteration snapshot.
pub trait SnapshotStore {
    fn save_itr_params(&mut self, itr: usize, params: &Value) -> Result<(), CheckpointError>;
}

const LAST_FILE: &str = "params.json";

/// Directory-backed snapshot store.
#[derive(Debug)]
pub struct Checkpointer {
    config: CheckpointerConfig,
}

impl Checkpointer {
    /// Creates the checkpoint directory if it doesn't exist.
    pub fn new(config: CheckpointerConfig) -> Result<Self, CheckpointError> {
        if config.mode == SnapshotMode::Gap(0) {
            return Err(CheckpointError::InvalidGap);
        }
        if config.mode != SnapshotMode::None {
            fs::create_dir_all(&config.checkpoint_dir)?;
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &CheckpointerConfig {
        &self.config
    }

    /// File written for `itr`, if this mode writes one.
    pub fn path_for(&self, itr: usize) -> Option<PathBuf> {
        let dir = &self.config.checkpoint_dir;
        match self.config.mode {
            SnapshotMode::All => Some(dir.join(format!("itr_{}.json", itr))),
            SnapshotMode::Gap(n) if itr % n == 0 => Some(dir.join(format!("itr_{}.json", itr))),
            SnapshotMode::Gap(_) | SnapshotMode::None => None,
            SnapshotMode::Last => Some(dir.join(LAST_FILE)),
        }
    }

    /// Per-iteration snapshots in the directory, sorted by iteration.
    pub fn list_checkpoints(&self) -> Result<Vec<CheckpointInfo>, CheckpointError> {
        let dir = &self.config.checkpoint_dir;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut checkpoints: Vec<CheckpointInfo> = fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                let itr = path
                    .file_name()?
                    .to_str()?
                    .strip_prefix("itr_")?
                    .strip_suffix(".json")?
                    .parse()
                    .ok()?;
                Some(CheckpointInfo { path, itr })
            })
            .collect();

        checkpoints.sort_by_key(|c| c.itr);
        Ok(checkpoints)
    }

    /// Last iteration with a snapshot on disk.
    ///
    /// Looks at `itr_*.json` files first, then at the `itr` field of
    /// `params.json`.
    pub fn latest_iteration(&self) -> Result<usize, CheckpointError> {
        if let Some(last) = self.list_checkpoints()?.pop() {
            return Ok(last.itr);
        }
        let last_path = self.config.checkpoint_dir.join(LAST_FILE);
        if !last_path.exists() {
            return Err(CheckpointError::NoCheckpoints);
        }
        let snapshot: Value = serde_json::from_slice(&fs::read(&last_path)?)?;
        snapshot
            .get("itr")
            .and_then(Value::as_u64)
            .map(|itr| itr as usize)
            .ok_or(CheckpointError::NoCheckpoints)
    }

    /// Iteration a resumed run should start from.
    pub fn resume_itr(&self) -> Result<usize, CheckpointError> {
        match self.latest_iteration() {
            Ok(itr) => Ok(itr + 1),
            Err(CheckpointError::NoCheckpoints) => Ok(0),
            Err(e) => Err(e),
        }
    }
}

impl SnapshotStore for Checkpointer {
    fn save_itr_params(&mut self, itr: usize, params: &Value) -> Result<(), CheckpointError> {
        let Some(path) = self.path_for(itr) else {
            return Ok(());
        };
        fs::write(&path, serde_json::to_vec_pretty(params)?)?;
        tracing::debug!(itr, path = %path.display(), "saved snapshot");
        Ok(())
    }
}

/// In-memory snapshot store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    snapshots: Vec<(usize, Value)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> &[(usize, Value)] {
        &self.snapshots
    }

    pub fn iterations(&self) -> Vec<usize> {
        self.snapshots.iter().map(|(itr, _)| *itr).collect()
    }
}

impl SnapshotStore for MemoryStore {
    fn save_itr_params(&mut self, itr: usize, params: &Value) -> Result<(), CheckpointError> {
        self.snapshots.push((itr, params.clone()));
        Ok(())
    }
}
