//! Restores scan order for results that complete out of order.

use std::collections::BTreeMap;

/// Holds results keyed by submission sequence number and releases them
/// strictly in sequence, starting at 0.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    pending: BTreeMap<u64, T>,
    next_expected: u64,
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReorderBuffer<T> {
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            next_expected: 0,
        }
    }

    /// Sequence numbers already released are ignored.
    pub fn insert(&mut self, seq: u64, item: T) {
        if seq < self.next_expected {
            log::warn!("Dropping duplicate result for sequence {}", seq);
            return;
        }
        self.pending.insert(seq, item);
    }

    /// Release the next item if it has arrived
    pub fn pop_ready(&mut self) -> Option<T> {
        let item = self.pending.remove(&self.next_expected)?;
        self.next_expected += 1;
        Some(item)
    }

    pub fn next_seq(&self) -> u64 {
        self.next_expected
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// True when `current` sorts before `previous` by unsigned byte comparison
pub fn is_regression(previous: &str, current: &str) -> bool {
    current.as_bytes() < previous.as_bytes()
}
