//! Fixed-window counter store.
//!
//! The reset-if-expired and increment-if-below-limit steps run under the
//! DashMap entry lock, so concurrent callers on one key never over-admit.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

use crate::clock::Clock;
use crate::store::StoreError;

/// One key's current window. Covers `[window_start, window_start + window)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowState {
    pub window_start: DateTime<Utc>,
    pub count: u32,
    pub limit: u32,
    pub window: Duration,
}

impl WindowState {
    fn open(now: DateTime<Utc>, limit: u32, window: Duration) -> Self {
        Self {
            window_start: now,
            count: 0,
            limit,
            window,
        }
    }

    pub fn resets_at(&self) -> DateTime<Utc> {
        self.window_start + self.window
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.resets_at()
    }
}

/// Result of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub admitted: bool,
    /// Count after this check
    pub count: u32,
    pub limit: u32,
    pub resets_at: DateTime<Utc>,
}

/// Shared counter backend. `admit` must be a single atomic step per key.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn admit(&self, key: &str, limit: u32, window: Duration)
    -> Result<Admission, StoreError>;

    /// Live window for `key`, `None` if absent or expired.
    async fn peek(&self, key: &str) -> Result<Option<WindowState>, StoreError>;

    async fn reset(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-local counter store.
pub struct MemoryCounterStore {
    windows: DashMap<String, WindowState>,
    clock: Arc<dyn Clock>,
}

impl MemoryCounterStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            clock,
        }
    }

    /// Drop expired windows. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows.retain(|_, state| !state.is_expired(now));
        before.saturating_sub(self.windows.len())
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn admit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<Admission, StoreError> {
        let now = self.clock.now();
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| WindowState::open(now, limit, window));
        let state = entry.value_mut();

        if state.is_expired(now) {
            *state = WindowState::open(now, limit, window);
        }
        state.limit = limit;

        let admitted = state.count < limit;
        if admitted {
            state.count += 1;
        }

        Ok(Admission {
            admitted,
            count: state.count,
            limit,
            resets_at: state.resets_at(),
        })
    }

    async fn peek(&self, key: &str) -> Result<Option<WindowState>, StoreError> {
        let now = self.clock.now();
        Ok(self
            .windows
            .get(key)
            .filter(|state| !state.is_expired(now))
            .map(|state| state.value().clone()))
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        self.windows.remove(key);
        Ok(())
    }
}
