//! Incremental log cursor.
//!
//! Tracks, per [`MonitorTarget`], the time up to which logs have been
//! consumed so each poll fetches only new content.
//!
//! The checkpoint advances when the window is computed, before the fetch that
//! uses it completes. A failed fetch therefore loses that interval, but the
//! window stays bounded by the poll interval under persistent failure.
//!
//! If the poll interval exceeds the log backend's retention, gaps are possible
//! and are not compensated.
//!
//! Entries for pods that disappear are never removed; growth is bounded by
//! pod churn.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::clock::SharedClock;
use crate::types::MonitorTarget;

/// Default window for a target's first fetch, in seconds.
pub const DEFAULT_SINCE_SECONDS: u64 = 60;

/// Per-target log checkpoints.
pub struct LogCursor {
    checkpoints: Mutex<HashMap<MonitorTarget, DateTime<Utc>>>,
    initial_window_secs: u64,
    clock: SharedClock,
}

impl std::fmt::Debug for LogCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogCursor")
            .field("targets", &self.checkpoints.lock().len())
            .field("initial_window_secs", &self.initial_window_secs)
            .finish_non_exhaustive()
    }
}

impl LogCursor {
    /// Creates a cursor whose first window for a target is `initial_window_secs`.
    #[must_use]
    pub fn new(initial_window_secs: u64, clock: SharedClock) -> Self {
        Self {
            checkpoints: Mutex::new(HashMap::new()),
            initial_window_secs,
            clock,
        }
    }

    /// Returns the fetch window for `target` in seconds and advances its checkpoint.
    ///
    /// The first call for a target returns the initial window. Later calls
    /// return the whole seconds elapsed since the previous call, clamped to
    /// zero if the clock went backwards.
    pub fn window_for(&self, target: &MonitorTarget) -> u64 {
        let now = self.clock.now();
        let mut checkpoints = self.checkpoints.lock();

        match checkpoints.insert(target.clone(), now) {
            None => self.initial_window_secs,
            Some(last) => (now - last).num_seconds().max(0) as u64,
        }
    }

    /// Returns the last checkpoint for `target`, if it has been observed.
    #[must_use]
    pub fn checkpoint(&self, target: &MonitorTarget) -> Option<DateTime<Utc>> {
        self.checkpoints.lock().get(target).copied()
    }

    /// Returns the number of targets observed so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.checkpoints.lock().len()
    }

    /// Returns true if no target has been observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
