//! Durable resume point for a migration run.

use std::fs::{self, OpenOptions};
#[cfg(unix)]
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Checkpoint path has no file name: {0}")]
    InvalidPath(PathBuf),
}

impl CheckpointError {
    pub fn class(&self) -> &'static str {
        match self {
            CheckpointError::Io(_) => "CheckpointError::Io",
            CheckpointError::Corrupt(_) => "CheckpointError::Corrupt",
            CheckpointError::InvalidPath(_) => "CheckpointError::InvalidPath",
        }
    }
}

/// Snapshot of progress: the last document id of the contiguous successful
/// prefix plus cumulative counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    #[serde(default)]
    pub last_successful_id: Option<String>,
    #[serde(default)]
    pub scanned: u64,
    #[serde(default)]
    pub encrypted: u64,
    #[serde(default)]
    pub written: u64,
    #[serde(default)]
    pub quarantined: u64,
}

impl Checkpoint {
    pub fn new(
        last_successful_id: Option<String>,
        scanned: u64,
        encrypted: u64,
        written: u64,
        quarantined: u64,
    ) -> Self {
        Self {
            last_successful_id: normalize_id(last_successful_id),
            scanned,
            encrypted,
            written,
            quarantined,
        }
    }
}

fn normalize_id(id: Option<String>) -> Option<String> {
    id.filter(|s| !s.trim().is_empty())
}

/// Reads and atomically replaces a single checkpoint file
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or empty file means no checkpoint yet
    pub fn load(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let mut checkpoint: Checkpoint = serde_json::from_slice(&bytes)?;
        checkpoint.last_successful_id = normalize_id(checkpoint.last_successful_id.take());
        Ok(Some(checkpoint))
    }

    /// Write to a uniquely named sibling, fsync, then rename over the target.
    /// A concurrent reader sees either the old or the new checkpoint.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| CheckpointError::InvalidPath(self.path.clone()))?;
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let json = serde_json::to_vec_pretty(checkpoint)?;
        let tmp_path = dir.join(format!(
            "{}.tmp-{}",
            file_name.to_string_lossy(),
            Uuid::new_v4()
        ));

        let result = write_synced(&tmp_path, &json).and_then(|_| fs::rename(&tmp_path, &self.path));
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        sync_dir(&dir);
        Ok(())
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Best effort: make the rename itself durable
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) {
    if let Ok(d) = File::open(dir) {
        if let Err(e) = d.sync_all() {
            log::debug!("Directory fsync failed for {}: {}", dir.display(), e);
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) {}
