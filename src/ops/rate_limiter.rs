//! Process-wide request pacing.
//!
//! The limiter keeps a single "next free slot" cursor in nanoseconds relative
//! to its creation instant. Callers claim a slot with a compare-and-swap and
//! then sleep until it arrives, so waiting happens outside any lock and many
//! tasks can be paced concurrently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateLimitError {
    #[error("Rate must be a finite number, got {0}")]
    InvalidRate(f64),

    #[error("Rate limiter cursor overflowed")]
    CursorOverflow,
}

impl RateLimitError {
    pub fn class(&self) -> &'static str {
        match self {
            RateLimitError::InvalidRate(_) => "RateLimitError::InvalidRate",
            RateLimitError::CursorOverflow => "RateLimitError::CursorOverflow",
        }
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    interval_nanos: u64,
    origin: Instant,
    next_free: AtomicU64,
}

impl RateLimiter {
    /// Pace to `permits_per_second`. Zero or negative means unlimited, as does
    /// a rate so high that the interval rounds below one nanosecond.
    pub fn new(permits_per_second: f64) -> Result<Self, RateLimitError> {
        if !permits_per_second.is_finite() {
            return Err(RateLimitError::InvalidRate(permits_per_second));
        }
        let interval_nanos = if permits_per_second <= 0.0 {
            0
        } else {
            let nanos = 1e9 / permits_per_second;
            if nanos < 1.0 {
                0
            } else if nanos >= u64::MAX as f64 {
                u64::MAX
            } else {
                nanos as u64
            }
        };

        Ok(Self {
            interval_nanos,
            origin: Instant::now(),
            next_free: AtomicU64::new(0),
        })
    }

    pub fn unlimited() -> Self {
        Self {
            interval_nanos: 0,
            origin: Instant::now(),
            next_free: AtomicU64::new(0),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_nanos(self.interval_nanos)
    }

    pub fn is_unlimited(&self) -> bool {
        self.interval_nanos == 0
    }

    fn now_nanos(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Wait for the next slot. Slots are handed out at most one per interval.
    pub async fn acquire(&self) -> Result<(), RateLimitError> {
        if self.is_unlimited() {
            return Ok(());
        }

        let slot = loop {
            let now = self.now_nanos();
            let current = self.next_free.load(Ordering::Acquire);
            let slot = now.max(current);
            let next = slot
                .checked_add(self.interval_nanos)
                .ok_or(RateLimitError::CursorOverflow)?;
            if self
                .next_free
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break slot;
            }
        };

        let now = self.now_nanos();
        if slot > now {
            tokio::time::sleep(Duration::from_nanos(slot - now)).await;
        }
        Ok(())
    }

    /// Claim a slot only if one is free right now.
    pub fn try_acquire(&self) -> bool {
        if self.is_unlimited() {
            return true;
        }

        loop {
            let now = self.now_nanos();
            let current = self.next_free.load(Ordering::Acquire);
            if now < current {
                return false;
            }
            let Some(next) = now.checked_add(self.interval_nanos) else {
                return false;
            };
            if self
                .next_free
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }
}
