//! Run-level (fatal) migration errors

use thiserror::Error;

use crate::ops::{CheckpointError, QuarantineError};
use crate::store::StoreError;

/// Errors that abort a migration run. Per-document failures never surface
/// here; they become quarantine records.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Invalid migration config: {0}")]
    InvalidConfig(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Quarantine error: {0}")]
    Quarantine(#[from] QuarantineError),

    #[error("Scan failed: {0}")]
    Scan(#[source] StoreError),

    #[error("Scan returned non-monotonic ids; cannot safely resume (previous={previous}, current={current})")]
    NonMonotonicScan { previous: String, current: String },

    #[error("Worker for sequence {seq} panicked")]
    WorkerPanicked { seq: u64 },

    #[error("Worker results lost: submitted {expected}, folded {folded}")]
    WorkerLost { expected: u64, folded: u64 },

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl MigrationError {
    pub fn class(&self) -> &'static str {
        match self {
            MigrationError::InvalidConfig(_) => "MigrationError::InvalidConfig",
            MigrationError::Checkpoint(_) => "MigrationError::Checkpoint",
            MigrationError::Quarantine(_) => "MigrationError::Quarantine",
            MigrationError::Scan(_) => "MigrationError::Scan",
            MigrationError::NonMonotonicScan { .. } => "MigrationError::NonMonotonicScan",
            MigrationError::WorkerPanicked { .. } => "MigrationError::WorkerPanicked",
            MigrationError::WorkerLost { .. } => "MigrationError::WorkerLost",
            MigrationError::Join(_) => "MigrationError::Join",
        }
    }
}

pub type MigrationResult<T> = Result<T, MigrationError>;
