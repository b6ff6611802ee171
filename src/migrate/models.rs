//! Run configuration, per-document outcomes and the ordered run-state fold.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use super::errors::MigrationError;
use crate::ops::Checkpoint;
use crate::store::DurabilityLevel;

pub const DEFAULT_MAX_IN_FLIGHT: usize = 32;
pub const DEFAULT_CHECKPOINT_EVERY: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    pub max_in_flight: usize,
    /// Completed outcomes between periodic checkpoints; 0 disables them
    pub checkpoint_every: u64,
    pub dry_run: bool,
    pub durability: DurabilityLevel,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
            dry_run: true,
            durability: DurabilityLevel::default(),
        }
    }
}

impl MigrationConfig {
    pub fn validate(&self) -> Result<(), MigrationError> {
        if self.max_in_flight == 0 {
            return Err(MigrationError::InvalidConfig("max_in_flight must be > 0".into()));
        }
        Ok(())
    }
}

/// Pipeline phase that produced a per-document failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Get,
    RateLimit,
    Encrypt,
    Upsert,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Get => "GET",
            Stage::RateLimit => "RATE_LIMIT",
            Stage::Encrypt => "ENCRYPT",
            Stage::Upsert => "UPSERT",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("{stage} stage failed")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: Box<dyn StdError + Send + Sync + 'static>,
}

impl StageError {
    pub fn new(stage: Stage, source: impl StdError + Send + Sync + 'static) -> Self {
        Self {
            stage,
            source: Box::new(source),
        }
    }
}

/// Result of pushing one document through the pipeline. `encrypted` is true
/// when the scanner changed the document, even if a later stage failed.
#[derive(Debug)]
pub enum DocumentOutcome {
    Written { id: String, encrypted: bool },
    DryRun { id: String, encrypted: bool },
    Quarantined { id: String, encrypted: bool, error: StageError },
}

impl DocumentOutcome {
    pub fn id(&self) -> &str {
        match self {
            DocumentOutcome::Written { id, .. }
            | DocumentOutcome::DryRun { id, .. }
            | DocumentOutcome::Quarantined { id, .. } => id,
        }
    }

    pub fn encrypted(&self) -> bool {
        match self {
            DocumentOutcome::Written { encrypted, .. }
            | DocumentOutcome::DryRun { encrypted, .. }
            | DocumentOutcome::Quarantined { encrypted, .. } => *encrypted,
        }
    }
}

/// Counters and resume pointer. Mutated only by folding outcomes in scan
/// order; the first quarantine freezes the pointer for the rest of the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    last_successful_id: Option<String>,
    scanned: u64,
    encrypted: u64,
    written: u64,
    quarantined: u64,
    frozen: bool,
    completed: u64,
}

impl RunState {
    pub fn resume(checkpoint: Option<&Checkpoint>) -> Self {
        match checkpoint {
            Some(cp) => Self {
                last_successful_id: cp.last_successful_id.clone(),
                scanned: cp.scanned,
                encrypted: cp.encrypted,
                written: cp.written,
                quarantined: cp.quarantined,
                ..Self::default()
            },
            None => Self::default(),
        }
    }

    pub fn record(&mut self, outcome: &DocumentOutcome) {
        self.scanned += 1;
        if outcome.encrypted() {
            self.encrypted += 1;
        }
        match outcome {
            DocumentOutcome::Written { id, .. } => {
                self.written += 1;
                if !self.frozen {
                    self.last_successful_id = Some(id.clone());
                }
            }
            DocumentOutcome::DryRun { .. } => {}
            DocumentOutcome::Quarantined { .. } => {
                self.quarantined += 1;
                self.frozen = true;
            }
        }
        self.completed += 1;
    }

    /// Outcomes folded during this run
    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn checkpoint_due(&self, every: u64) -> bool {
        every > 0 && self.completed > 0 && self.completed % every == 0
    }

    pub fn snapshot(&self) -> Checkpoint {
        Checkpoint::new(
            self.last_successful_id.clone(),
            self.scanned,
            self.encrypted,
            self.written,
            self.quarantined,
        )
    }
}
