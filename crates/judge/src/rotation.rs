//! Credential and preferred-strategy rotation state.
//!
//! [`JudgeRotation`] is the only mutable state in the gateway. It is held
//! behind an `Arc` so a single instance can be shared by every gateway in a
//! process, and guarded by a mutex so concurrent runs cannot interleave a
//! read-modify-write of the cursor.

use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RotationSnapshot {
    /// Index into the hosted credential pool.
    pub credential: usize,
    /// Index of the strategy tried first.
    pub preferred: usize,
}

/// Mutex-guarded rotation cursor.
#[derive(Debug, Default)]
pub struct JudgeRotation {
    state: Mutex<RotationSnapshot>,
}

impl JudgeRotation {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RotationSnapshot> {
        // The state is two plain indices; a panic elsewhere cannot leave
        // it half-written.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> RotationSnapshot {
        *self.lock()
    }

    /// Current credential index for a pool of `pool_len` keys, or `None`
    /// for an empty pool.
    pub fn credential_index(&self, pool_len: usize) -> Option<usize> {
        (pool_len > 0).then(|| self.lock().credential % pool_len)
    }

    /// Advance to the next credential after a rate limit. Returns the new
    /// index, or `None` for an empty pool.
    pub fn rotate_credential(&self, pool_len: usize) -> Option<usize> {
        if pool_len == 0 {
            return None;
        }
        let mut state = self.lock();
        state.credential = (state.credential + 1) % pool_len;
        Some(state.credential)
    }

    pub fn preferred(&self) -> usize {
        self.lock().preferred
    }

    /// Remember the strategy that produced a usable judgment.
    pub fn mark_success(&self, strategy: usize) {
        self.lock().preferred = strategy;
    }

    /// Return to the cheapest strategy after a fully exhausted chain.
    pub fn reset_preferred(&self) {
        self.lock().preferred = 0;
    }
}
