//! IndexService - the narrow surface the UI and launch layers call into.

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::store::IndexStore;
use crate::types::{IndexStats, Item};
use crate::watcher::{start_watching, WatchHandle, WatchOptions};

/// Receives the full item list after every rebuild or flushed batch.
pub type IndexListener = Arc<dyn Fn(&[Item]) + Send + Sync>;

/// Starts an indexed item with whatever the platform uses to open files.
pub trait Launcher: Send + Sync {
    fn open(&self, path: &Path) -> io::Result<()>;
}

/// Opens items with the platform default handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn open(&self, path: &Path) -> io::Result<()> {
        let mut command = opener_command(path);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
    }
}

#[cfg(target_os = "windows")]
fn opener_command(path: &Path) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg("start").arg("").arg(path);
    command
}

#[cfg(target_os = "macos")]
fn opener_command(path: &Path) -> Command {
    let mut command = Command::new("open");
    command.arg(path);
    command
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn opener_command(path: &Path) -> Command {
    let mut command = Command::new("xdg-open");
    command.arg(path);
    command
}

/// Result of a launch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl LaunchOutcome {
    fn success() -> Self {
        Self {
            ok: true,
            error_reason: None,
        }
    }

    fn failure(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            error_reason: Some(reason.into()),
        }
    }
}

/// Owns the store, the optional watcher and the change listeners.
pub struct IndexService {
    store: Arc<IndexStore>,
    launcher: Box<dyn Launcher>,
    listeners: Arc<RwLock<Vec<IndexListener>>>,
    watch: Mutex<Option<WatchHandle>>,
}

impl std::fmt::Debug for IndexService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexService")
            .field("store", &self.store)
            .field("listeners", &self.listeners.read().len())
            .field("watching", &self.is_watching())
            .finish()
    }
}

impl IndexService {
    pub fn new(config: IndexConfig) -> Self {
        Self::with_launcher(config, Box::new(SystemLauncher))
    }

    pub fn with_launcher(config: IndexConfig, launcher: Box<dyn Launcher>) -> Self {
        Self {
            store: Arc::new(IndexStore::new(config)),
            launcher,
            listeners: Arc::new(RwLock::new(Vec::new())),
            watch: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    /// Returns the current index, building it on first use if absent.
    pub fn get_index(&self) -> Vec<Item> {
        let (snapshot, rebuilt) = self.store.load_or_rebuild();
        let items: Vec<Item> = snapshot.into_values().collect();
        if rebuilt {
            notify_listeners(&self.listeners, &items);
        }
        items
    }

    /// Rebuilds from a fresh crawl regardless of any stored snapshot.
    pub fn refresh(&self) -> Vec<Item> {
        let items: Vec<Item> = self.store.rebuild().into_values().collect();
        notify_listeners(&self.listeners, &items);
        items
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats::from_snapshot(&self.store.snapshot())
    }

    /// Starts `path` and, on success, records the launch in the index.
    pub fn launch(&self, path: &Path) -> LaunchOutcome {
        if path.as_os_str().is_empty() {
            return LaunchOutcome::failure("no-file");
        }

        if let Err(error) = self.launcher.open(path) {
            let error = IndexError::Launch(format!("{}: {error}", path.display()));
            log::warn!("{error}");
            return LaunchOutcome::failure(error.to_string());
        }

        if !self.store.record_launch(path) {
            log::debug!("launched path not in index: {}", path.display());
        }
        LaunchOutcome::success()
    }

    /// Registers a listener for rebuilds and flushed watcher batches.
    pub fn on_index_changed(&self, listener: impl Fn(&[Item]) + Send + Sync + 'static) {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Starts watching the configured roots. A running watcher is replaced.
    pub fn start_watching(&self) -> Result<()> {
        let config = self.store.config();
        let store = self.store.clone();
        let listeners = self.listeners.clone();
        let handle = start_watching(
            &config.watch_roots(),
            WatchOptions::from_config(config),
            self.store.clone(),
            Arc::new(move || {
                let items = store.items();
                notify_listeners(&listeners, &items);
            }),
        )?;

        // Closing joins the flush worker, whose listeners may call back in.
        let previous = self.watch.lock().replace(handle);
        if let Some(previous) = previous {
            previous.close();
        }
        Ok(())
    }

    pub fn is_watching(&self) -> bool {
        self.watch
            .lock()
            .as_ref()
            .is_some_and(WatchHandle::is_active)
    }

    /// Stops watching. Safe to call repeatedly.
    pub fn close(&self) {
        let handle = self.watch.lock().take();
        if let Some(handle) = handle {
            handle.close();
        }
    }
}

impl Drop for IndexService {
    fn drop(&mut self) {
        self.close();
    }
}

fn notify_listeners(listeners: &RwLock<Vec<IndexListener>>, items: &[Item]) {
    let listeners = listeners.read().clone();
    for listener in listeners {
        listener(items);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CrawlOptions, CrawlRoot, ExtensionSets};
    use crate::store::load_snapshot;
    use crate::types::ItemKind;
    use crossbeam_channel::bounded;
    use std::fs::{self, File};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    struct FakeLauncher {
        fail: bool,
        opened: Mutex<Vec<PathBuf>>,
    }

    impl Launcher for Arc<FakeLauncher> {
        fn open(&self, path: &Path) -> io::Result<()> {
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no handler"));
            }
            self.opened.lock().push(path.to_path_buf());
            Ok(())
        }
    }

    fn fake(fail: bool) -> Arc<FakeLauncher> {
        Arc::new(FakeLauncher {
            fail,
            opened: Mutex::new(Vec::new()),
        })
    }

    fn config(temp: &TempDir) -> IndexConfig {
        let root = temp.path().join("root");
        fs::create_dir_all(&root).unwrap();
        File::create(root.join("foo.lnk")).unwrap();
        File::create(root.join("bar.txt")).unwrap();
        File::create(root.join("baz.exe")).unwrap();

        let mut config = IndexConfig::new(temp.path().join("data/app-index.json"))
            .with_root(CrawlRoot::new(root, CrawlOptions::content()));
        config.extensions = ExtensionSets::new(&[".lnk"], &[".txt"]);
        config
    }

    #[test]
    fn get_index_builds_once_and_notifies() {
        let temp = TempDir::new().unwrap();
        let service = IndexService::with_launcher(config(&temp), Box::new(fake(false)));
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        service.on_index_changed(move |items| {
            assert_eq!(items.len(), 2);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let first = service.get_index();
        let second = service.get_index();

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert_eq!(service.stats().applications, 1);
        assert_eq!(service.stats().files, 1);
    }

    #[test]
    fn launch_records_usage() {
        let temp = TempDir::new().unwrap();
        let launcher = fake(false);
        let service = IndexService::with_launcher(config(&temp), Box::new(launcher.clone()));
        service.get_index();
        let foo = temp.path().join("root/foo.lnk");

        assert_eq!(service.launch(&foo), LaunchOutcome::success());
        assert_eq!(service.launch(&foo), LaunchOutcome::success());

        let snapshot = load_snapshot(service.store().snapshot_path());
        assert_eq!(snapshot[&foo].launch_count, 2);
        assert!(snapshot[&foo].last_used > 0);
        assert_eq!(launcher.opened.lock().len(), 2);
    }

    #[test]
    fn launch_of_unindexed_path_still_opens() {
        let temp = TempDir::new().unwrap();
        let launcher = fake(false);
        let service = IndexService::with_launcher(config(&temp), Box::new(launcher.clone()));
        service.get_index();
        let before = fs::read_to_string(service.store().snapshot_path()).unwrap();

        let outcome = service.launch(Path::new("/somewhere/else.lnk"));

        assert!(outcome.ok);
        assert_eq!(launcher.opened.lock().len(), 1);
        let after = fs::read_to_string(service.store().snapshot_path()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn failed_launch_reports_reason_without_counting() {
        let temp = TempDir::new().unwrap();
        let service = IndexService::with_launcher(config(&temp), Box::new(fake(true)));
        service.get_index();
        let foo = temp.path().join("root/foo.lnk");

        let outcome = service.launch(&foo);
        assert!(!outcome.ok);
        assert!(outcome.error_reason.is_some());
        assert_eq!(service.store().snapshot()[&foo].launch_count, 0);

        let empty = service.launch(Path::new(""));
        assert_eq!(empty.error_reason.as_deref(), Some("no-file"));
    }

    #[test]
    fn refresh_keeps_usage_and_notifies() {
        let temp = TempDir::new().unwrap();
        let service = IndexService::with_launcher(config(&temp), Box::new(fake(false)));
        service.get_index();
        let foo = temp.path().join("root/foo.lnk");
        service.launch(&foo);
        File::create(temp.path().join("root/new.lnk")).unwrap();

        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        service.on_index_changed(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let items = service.refresh();

        assert_eq!(items.len(), 3);
        let foo_item = items.iter().find(|item| item.path == foo).unwrap();
        assert_eq!(foo_item.launch_count, 1);
        assert_eq!(foo_item.kind, ItemKind::Application);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn launch_outcome_wire_shape() {
        let json = serde_json::to_value(LaunchOutcome::failure("no-file")).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["errorReason"], "no-file");
        let json = serde_json::to_value(LaunchOutcome::success()).unwrap();
        assert!(json.get("errorReason").is_none());
    }

    #[test]
    fn get_index_builds_after_earlier_reads() {
        let temp = TempDir::new().unwrap();
        let service = IndexService::with_launcher(config(&temp), Box::new(fake(false)));

        assert_eq!(service.stats().total, 0);
        let items = service.get_index();
        assert_eq!(items.len(), 2);
        assert_eq!(service.stats().total, 2);
    }

    #[test]
    fn get_index_rebuilds_over_corrupt_file_after_earlier_reads() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        fs::create_dir_all(config.snapshot_path.parent().unwrap()).unwrap();
        fs::write(&config.snapshot_path, "{{{").unwrap();
        let service = IndexService::with_launcher(config, Box::new(fake(false)));

        assert!(service.store().items().is_empty());
        service.launch(&temp.path().join("root/foo.lnk"));
        assert_eq!(service.get_index().len(), 2);
    }

    #[test]
    fn close_during_listener_callback_returns() {
        let temp = TempDir::new().unwrap();
        let service = Arc::new(IndexService::with_launcher(
            config(&temp),
            Box::new(fake(false)),
        ));
        service.get_index();

        let (entered_tx, entered_rx) = bounded::<()>(1);
        let weak = Arc::downgrade(&service);
        service.on_index_changed(move |_| {
            let _ = entered_tx.try_send(());
            thread::sleep(Duration::from_millis(200));
            if let Some(service) = weak.upgrade() {
                let _ = service.is_watching();
            }
        });
        service.start_watching().unwrap();
        fs::write(temp.path().join("root/notes.txt"), "x").unwrap();
        entered_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("listener never ran");

        let (done_tx, done_rx) = bounded::<()>(1);
        let closer = service.clone();
        thread::spawn(move || {
            closer.close();
            let _ = done_tx.send(());
        });

        assert!(done_rx.recv_timeout(Duration::from_secs(5)).is_ok());
        assert!(!service.is_watching());
    }

    #[test]
    fn watching_can_start_and_close_repeatedly() {
        let temp = TempDir::new().unwrap();
        let service = IndexService::with_launcher(config(&temp), Box::new(fake(false)));
        service.get_index();

        service.start_watching().unwrap();
        assert!(service.is_watching());
        service.close();
        service.close();
        assert!(!service.is_watching());
    }
}
