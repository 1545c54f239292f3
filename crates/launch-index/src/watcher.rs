//! Filesystem watching for incremental index updates.
//!
//! Events move through three states: idle, accumulating (paths collect in a
//! pending set while the settle window keeps restarting), and flushing (each
//! settled path is reconciled, then the change callback fires once).

mod debounce;
mod events;
mod filter;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Sender};
use notify::RecommendedWatcher;
use parking_lot::Mutex;

use crate::config::IndexConfig;
use crate::error::Result;
use crate::reconcile::PathReconciler;

pub use debounce::{PendingPaths, DEFAULT_MAX_PENDING};
pub use events::{
    create_index_watcher, flush_batch, run_flush_worker, ChangeCallback, FlushSummary,
    WatcherEvent,
};
pub use filter::{parent_is_accessible, root_is_watchable, WatchFilter};

/// Watcher tuning derived from the index config.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub settle_window: Duration,
    pub max_depth: usize,
    pub ignored_names: BTreeSet<String>,
    pub max_pending: usize,
}

impl WatchOptions {
    pub fn from_config(config: &IndexConfig) -> Self {
        Self {
            settle_window: config.settle_window,
            max_depth: config.watch_depth,
            ignored_names: config.ignored_names.clone(),
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

struct ActiveWatch {
    // Dropping the watcher ends the subscription.
    watcher: RecommendedWatcher,
    event_tx: Sender<WatcherEvent>,
    worker: JoinHandle<()>,
}

/// A running subscription. `close` is idempotent and also runs on drop.
pub struct WatchHandle {
    active: Mutex<Option<ActiveWatch>>,
    roots: Vec<PathBuf>,
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("roots", &self.roots)
            .field("active", &self.is_active())
            .finish()
    }
}

impl WatchHandle {
    /// A handle with nothing to stop.
    pub fn inert() -> Self {
        Self {
            active: Mutex::new(None),
            roots: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Roots that were valid when watching started.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Stops the subscription and waits for an in-flight flush to finish.
    pub fn close(&self) {
        let Some(active) = self.active.lock().take() else {
            return;
        };
        drop(active.watcher);
        let _ = active.event_tx.send(WatcherEvent::Shutdown);
        if active.worker.thread().id() == thread::current().id() {
            // Closed from inside the change callback; the worker exits on its own.
            return;
        }
        if active.worker.join().is_err() {
            log::warn!("index watcher worker panicked");
        }
        log::debug!("index watcher closed roots={}", self.roots.len());
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Starts watching `roots`, reconciling settled paths through `reconciler`.
///
/// Missing or unreadable roots are skipped with a warning. With no valid root
/// the returned handle is inert.
pub fn start_watching(
    roots: &[PathBuf],
    options: WatchOptions,
    reconciler: Arc<dyn PathReconciler>,
    on_change: ChangeCallback,
) -> Result<WatchHandle> {
    let watch_roots: Vec<PathBuf> = roots
        .iter()
        .filter(|root| {
            let ok = root_is_watchable(root);
            if !ok {
                log::warn!("index watcher skipping unreadable root {}", root.display());
            }
            ok
        })
        .cloned()
        .collect();

    if watch_roots.is_empty() {
        log::info!("index watcher has no valid roots to watch");
        return Ok(WatchHandle::inert());
    }

    let (event_tx, event_rx) = unbounded();
    let watcher = create_index_watcher(&watch_roots, event_tx.clone())?;

    let filter = WatchFilter::new(watch_roots.clone(), options.ignored_names, options.max_depth);
    let pending = PendingPaths::new(options.settle_window, options.max_pending);
    let worker = thread::Builder::new()
        .name("launch-index-watch".into())
        .spawn(move || run_flush_worker(event_rx, filter, pending, reconciler, on_change))?;

    log::info!(
        "index watcher started roots={} settle_ms={}",
        watch_roots.len(),
        options.settle_window.as_millis()
    );

    Ok(WatchHandle {
        active: Mutex::new(Some(ActiveWatch {
            watcher,
            event_tx,
            worker,
        })),
        roots: watch_roots,
    })
}
