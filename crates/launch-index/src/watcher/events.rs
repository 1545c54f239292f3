//! Event plumbing between notify and the flush worker.
//!
//! The notify callback never touches the index. It forwards events through a
//! crossbeam channel to a single worker thread, which owns the pending set and
//! runs every flush to completion before looking at the channel again.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::debounce::PendingPaths;
use super::filter::{parent_is_accessible, WatchFilter};
use crate::error::Result;
use crate::reconcile::PathReconciler;

/// Invoked once after every flushed batch.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// A message for the flush worker.
#[derive(Debug)]
pub enum WatcherEvent {
    /// Paths reported by the notification backend.
    PathsChanged(Vec<PathBuf>),
    /// The backend reported an error; watching continues.
    Error(String),
    /// Stop the worker after the current flush.
    Shutdown,
}

/// Outcome of one flushed batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushSummary {
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Creates a notify watcher that forwards into `event_tx`, watching every
/// root it can. Roots that fail to register are logged and skipped.
pub fn create_index_watcher(
    roots: &[PathBuf],
    event_tx: Sender<WatcherEvent>,
) -> Result<RecommendedWatcher> {
    let mut watcher = recommended_watcher(move |event_result: notify::Result<Event>| {
        match event_result {
            Ok(event) => {
                if matches!(event.kind, EventKind::Access(_)) {
                    return;
                }
                if event.need_rescan() {
                    log::warn!("filesystem watcher dropped events; index may be stale");
                }
                if !event.paths.is_empty() {
                    let _ = event_tx.send(WatcherEvent::PathsChanged(event.paths));
                }
            }
            Err(error) => {
                let _ = event_tx.send(WatcherEvent::Error(error.to_string()));
            }
        }
    })?;

    for root in roots {
        match watcher.watch(root, RecursiveMode::Recursive) {
            Ok(()) => log::debug!("watching {}", root.display()),
            Err(error) => log::warn!("failed to watch {}: {}", root.display(), error),
        }
    }

    Ok(watcher)
}

/// Runs the accumulate/flush loop until shutdown or disconnection.
pub fn run_flush_worker(
    event_rx: Receiver<WatcherEvent>,
    filter: WatchFilter,
    mut pending: PendingPaths,
    reconciler: Arc<dyn PathReconciler>,
    on_change: ChangeCallback,
) {
    loop {
        let event = match pending.deadline() {
            None => match event_rx.recv() {
                Ok(event) => event,
                Err(_) => break,
            },
            Some(deadline) => match event_rx.recv_deadline(deadline) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => {
                    if pending.is_due(Instant::now()) {
                        flush_pending(&mut pending, reconciler.as_ref(), &on_change);
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            },
        };

        match event {
            WatcherEvent::PathsChanged(paths) => {
                let mut full = false;
                for path in paths {
                    let Some(path) = filter.resolve(&path) else {
                        continue;
                    };
                    if !parent_is_accessible(&path) {
                        continue;
                    }
                    full |= pending.push(path, Instant::now());
                }
                if full {
                    log::debug!("pending set full ({} paths), flushing early", pending.len());
                    flush_pending(&mut pending, reconciler.as_ref(), &on_change);
                }
            }
            WatcherEvent::Error(message) => {
                log::warn!("filesystem watcher error: {message}");
            }
            WatcherEvent::Shutdown => break,
        }
    }

    if !pending.is_empty() {
        log::debug!("watcher stopped with {} unflushed paths", pending.len());
    }
}

fn flush_pending(
    pending: &mut PendingPaths,
    reconciler: &dyn PathReconciler,
    on_change: &ChangeCallback,
) {
    let started = Instant::now();
    let paths = pending.drain();
    let count = paths.len();
    let summary = flush_batch(paths, reconciler);

    log::info!(
        "index flush paths={} added={} removed={} unchanged={} failed={} elapsed_ms={}",
        count,
        summary.added,
        summary.removed,
        summary.unchanged,
        summary.failed,
        started.elapsed().as_millis(),
    );
    on_change();
}

/// Reconciles each path by its current state on disk.
///
/// Regular files are added or refreshed; anything else is removed. A failing
/// path is logged and does not stop the rest of the batch.
pub fn flush_batch(paths: Vec<PathBuf>, reconciler: &dyn PathReconciler) -> FlushSummary {
    let mut summary = FlushSummary::default();
    for path in paths {
        let is_file = fs::metadata(&path).map(|m| m.is_file()).unwrap_or(false);
        let result = if is_file {
            reconciler.reconcile_add(&path)
        } else {
            reconciler.reconcile_remove(&path)
        };
        match result {
            Ok(true) if is_file => summary.added += 1,
            Ok(true) => summary.removed += 1,
            Ok(false) => summary.unchanged += 1,
            Err(error) => {
                summary.failed += 1;
                log::warn!("failed to reconcile {}: {}", path.display(), error);
            }
        }
    }
    summary
}
