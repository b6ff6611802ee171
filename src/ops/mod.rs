//! Operational safety rails for a migration run: pacing, durable progress,
//! failure records and an external stop signal.

pub mod checkpoint;
pub mod kill_switch;
pub mod quarantine;
pub mod rate_limiter;

pub use checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
pub use kill_switch::{KillSwitch, KillSwitchError};
pub use quarantine::{error_class, QuarantineError, QuarantineWriter, DEFAULT_MAX_BYTES};
pub use rate_limiter::{RateLimitError, RateLimiter};
