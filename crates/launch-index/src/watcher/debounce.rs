//! Pending-path accumulation with a settle deadline.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Upper bound on distinct pending paths before a flush is forced.
pub const DEFAULT_MAX_PENDING: usize = 4096;

/// Paths waiting for the settle window to elapse.
///
/// Every push moves the deadline to `now + settle`, so a burst of events
/// keeps extending the window until it goes quiet.
#[derive(Debug)]
pub struct PendingPaths {
    paths: BTreeSet<PathBuf>,
    last_event: Option<Instant>,
    settle: Duration,
    capacity: usize,
}

impl PendingPaths {
    pub fn new(settle: Duration, capacity: usize) -> Self {
        Self {
            paths: BTreeSet::new(),
            last_event: None,
            settle,
            capacity: capacity.max(1),
        }
    }

    /// Adds a path and restarts the settle window.
    ///
    /// Returns true once the set reached capacity and should be flushed now.
    pub fn push(&mut self, path: PathBuf, now: Instant) -> bool {
        self.paths.insert(path);
        self.last_event = Some(now);
        self.paths.len() >= self.capacity
    }

    /// When the pending batch becomes due, if anything is pending.
    pub fn deadline(&self) -> Option<Instant> {
        if self.paths.is_empty() {
            return None;
        }
        self.last_event.map(|last| last + self.settle)
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Takes every pending path and returns to idle.
    pub fn drain(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        std::mem::take(&mut self.paths).into_iter().collect()
    }
}
