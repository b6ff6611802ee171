//! Migration orchestration
//!
//! This module provides:
//! - The per-document pipeline (fetch, pace, encrypt, write)
//! - Bounded concurrent execution with results folded in scan order
//! - Resume, periodic checkpointing and kill switch handling

pub mod errors;
pub mod job;
pub mod models;
pub mod ordering;

pub use errors::{MigrationError, MigrationResult};
pub use job::{DocumentPipeline, MigrationJob, KILL_SWITCH_POLL_INTERVAL};
pub use models::{
    DocumentOutcome, MigrationConfig, RunState, Stage, StageError, DEFAULT_CHECKPOINT_EVERY,
    DEFAULT_MAX_IN_FLIGHT,
};
pub use ordering::ReorderBuffer;
