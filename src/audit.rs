//! Per-run audit record, written once after a successful run.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ops::Checkpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub scanned: u64,
    pub encrypted: u64,
    pub written: u64,
    pub quarantined: u64,
}

impl From<&Checkpoint> for RunCounts {
    fn from(cp: &Checkpoint) -> Self {
        Self {
            scanned: cp.scanned,
            encrypted: cp.encrypted,
            written: cp.written,
            quarantined: cp.quarantined,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub host: String,
    pub config_checksum: String,
    pub key_id: String,
    pub durability: String,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<RunCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_successful_id: Option<String>,
}

impl AuditRecord {
    pub fn start(config_checksum: String, key_id: String, durability: String, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            host: local_hostname(),
            config_checksum,
            key_id,
            durability,
            dry_run,
            counts: None,
            last_successful_id: None,
        }
    }

    pub fn finish(&mut self, checkpoint: &Checkpoint) {
        self.ended_at = Some(Utc::now());
        self.counts = Some(RunCounts::from(checkpoint));
        self.last_successful_id = checkpoint.last_successful_id.clone();
    }

    pub fn file_name(&self) -> String {
        format!("audit-{}.json", self.run_id)
    }

    /// Write `audit-<runId>.json` into `dir` via temp file and rename
    pub fn write(&self, dir: &Path) -> std::io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let path = dir.join(self.file_name());
        let tmp_path = dir.join(format!("audit-{}.tmp", self.run_id));
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &path)?;
        Ok(path)
    }
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}
