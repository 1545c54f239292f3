//! Index store - the canonical path-keyed snapshot.
//!
//! The store owns the authoritative in-memory snapshot and mirrors it to the
//! durable index file after every mutation. All read-modify-write operations
//! (rebuild, reconcile, launch bookkeeping) run on a single mutation lane so
//! a pending mutation queues behind an in-flight one.

mod persistence;

use std::path::Path;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use crate::config::{IndexConfig, UsagePolicy};
use crate::crawler::crawl;
use crate::types::{IndexStats, Item, Snapshot};

pub use persistence::{load_snapshot, read_snapshot, save_snapshot, write_snapshot};

#[derive(Debug)]
struct CachedSnapshot {
    snapshot: Snapshot,
    /// Set when the snapshot came from a parseable file or a rebuild. An
    /// empty stand-in for a missing or corrupt file leaves it unset.
    established: bool,
}

impl CachedSnapshot {
    fn built(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            established: true,
        }
    }

    fn stand_in() -> Self {
        Self {
            snapshot: Snapshot::new(),
            established: false,
        }
    }
}

/// Path-keyed index backed by a single durable file.
#[derive(Debug)]
pub struct IndexStore {
    config: IndexConfig,
    /// `None` until first loaded from disk or built.
    snapshot: RwLock<Option<CachedSnapshot>>,
    mutation_lane: Mutex<()>,
}

impl IndexStore {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            snapshot: RwLock::new(None),
            mutation_lane: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.config.snapshot_path
    }

    /// Returns the current snapshot, loading it from disk on first use.
    ///
    /// A missing or corrupt file yields an empty snapshot.
    pub fn snapshot(&self) -> Snapshot {
        if let Some(cached) = self.snapshot.read().as_ref() {
            return cached.snapshot.clone();
        }
        let mut guard = self.snapshot.write();
        guard
            .get_or_insert_with(|| self.load_cached())
            .snapshot
            .clone()
    }

    /// Returns the current snapshot as a list of items.
    pub fn items(&self) -> Vec<Item> {
        self.snapshot().into_values().collect()
    }

    /// Writes the in-memory snapshot to disk. Failures are logged only.
    pub fn save(&self) -> bool {
        let _lane = self.mutation_lane.lock();
        let snapshot = self.snapshot();
        save_snapshot(&self.config.snapshot_path, &snapshot)
    }

    /// Crawls every configured root and replaces the snapshot.
    pub fn rebuild(&self) -> Snapshot {
        let _lane = self.mutation_lane.lock();
        self.rebuild_locked()
    }

    /// Returns the loaded snapshot if present and parseable, otherwise rebuilds.
    ///
    /// An in-memory snapshot that stands in for a missing or corrupt file
    /// still triggers the rebuild. The boolean is true when a rebuild happened.
    pub fn load_or_rebuild(&self) -> (Snapshot, bool) {
        let _lane = self.mutation_lane.lock();
        let loaded = {
            let mut guard = self.snapshot.write();
            let cached = guard.get_or_insert_with(|| self.load_cached());
            cached.established.then(|| cached.snapshot.clone())
        };

        match loaded {
            Some(snapshot) => (snapshot, false),
            None => (self.rebuild_locked(), true),
        }
    }

    fn load_cached(&self) -> CachedSnapshot {
        let path = &self.config.snapshot_path;
        match read_snapshot(path) {
            Ok(Some(snapshot)) => {
                log::debug!(
                    "index snapshot loaded path={} items={}",
                    path.display(),
                    snapshot.len()
                );
                CachedSnapshot::built(snapshot)
            }
            Ok(None) => CachedSnapshot::stand_in(),
            Err(error) => {
                log::warn!("index snapshot unreadable at {}: {}", path.display(), error);
                CachedSnapshot::stand_in()
            }
        }
    }

    fn rebuild_locked(&self) -> Snapshot {
        let started = Instant::now();
        let prior = match self.config.usage_policy {
            UsagePolicy::Preserve => self.prior_snapshot(),
            UsagePolicy::Reset => Snapshot::new(),
        };

        let found = crawl(&self.config.roots, &self.config.extensions);
        let crawled = found.len();
        let snapshot = merge_crawled(found, &prior);

        *self.snapshot.write() = Some(CachedSnapshot::built(snapshot.clone()));
        save_snapshot(&self.config.snapshot_path, &snapshot);

        let stats = IndexStats::from_snapshot(&snapshot);
        log::info!(
            "index rebuilt roots={} crawled={} total={} applications={} files={} policy={:?} elapsed_ms={}",
            self.config.roots.len(),
            crawled,
            stats.total,
            stats.applications,
            stats.files,
            self.config.usage_policy,
            started.elapsed().as_millis(),
        );
        snapshot
    }

    /// The snapshot a rebuild may consult for usage counters.
    fn prior_snapshot(&self) -> Snapshot {
        if let Some(cached) = self.snapshot.read().as_ref() {
            return cached.snapshot.clone();
        }
        read_snapshot(&self.config.snapshot_path)
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    /// Runs `mutate` against the snapshot on the mutation lane.
    ///
    /// When `mutate` reports a change the snapshot is persisted before the
    /// lane is released.
    pub(crate) fn mutate<R>(&self, mutate: impl FnOnce(&mut Snapshot) -> (R, bool)) -> R {
        let _lane = self.mutation_lane.lock();
        let (result, persisted) = {
            let mut guard = self.snapshot.write();
            let snapshot = &mut guard.get_or_insert_with(|| self.load_cached()).snapshot;
            let (result, changed) = mutate(snapshot);
            (result, changed.then(|| snapshot.clone()))
        };
        if let Some(snapshot) = persisted {
            save_snapshot(&self.config.snapshot_path, &snapshot);
        }
        result
    }
}

/// Merges crawl output into a path-keyed snapshot.
///
/// The first record for a path wins. Usage counters come from `prior` when it
/// has the path, otherwise they start at zero.
pub fn merge_crawled(items: Vec<Item>, prior: &Snapshot) -> Snapshot {
    let mut snapshot = Snapshot::new();
    for item in items {
        if snapshot.contains_key(&item.path) {
            continue;
        }
        let previous = prior.get(&item.path);
        let item = item.with_usage_from(previous);
        snapshot.insert(item.path.clone(), item);
    }
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CrawlOptions, CrawlRoot, ExtensionSets};
    use crate::types::ItemKind;
    use std::fs::{self, File};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn config_for(temp: &TempDir, policy: UsagePolicy) -> IndexConfig {
        let mut config = IndexConfig::new(temp.path().join("data/app-index.json"))
            .with_root(CrawlRoot::new(temp.path().join("root"), CrawlOptions::content()));
        config.extensions = ExtensionSets::new(&[".lnk"], &[".txt"]);
        config.usage_policy = policy;
        config
    }

    fn populate(temp: &TempDir) {
        let root = temp.path().join("root");
        fs::create_dir_all(&root).unwrap();
        File::create(root.join("foo.lnk")).unwrap();
        File::create(root.join("bar.txt")).unwrap();
        File::create(root.join("baz.exe")).unwrap();
    }

    #[test]
    fn rebuild_indexes_recognized_items() {
        let temp = TempDir::new().unwrap();
        populate(&temp);
        let store = IndexStore::new(config_for(&temp, UsagePolicy::Preserve));

        let snapshot = store.rebuild();
        assert_eq!(snapshot.len(), 2);

        let mut summary: Vec<(String, ItemKind)> = snapshot
            .values()
            .map(|item| (item.name.clone(), item.kind))
            .collect();
        summary.sort();
        assert_eq!(
            summary,
            vec![
                ("bar".to_string(), ItemKind::File),
                ("foo".to_string(), ItemKind::Application),
            ]
        );
        assert!(snapshot.values().all(|item| item.launch_count == 0));
        assert_eq!(load_snapshot(store.snapshot_path()), snapshot);
    }

    #[test]
    fn overlapping_roots_do_not_duplicate() {
        let temp = TempDir::new().unwrap();
        populate(&temp);
        let mut config = config_for(&temp, UsagePolicy::Preserve);
        config
            .roots
            .push(CrawlRoot::new(temp.path().join("root"), CrawlOptions::shortcuts()));
        config
            .roots
            .push(CrawlRoot::new(temp.path(), CrawlOptions::content()));
        let store = IndexStore::new(config);

        let items = store.rebuild();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn merge_keeps_first_occurrence() {
        let first = Item::new(PathBuf::from("/a/x.lnk"), ".lnk".into(), ItemKind::Application);
        let mut second = first.clone();
        second.name = "other".into();

        let snapshot = merge_crawled(vec![first, second], &Snapshot::new());
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[Path::new("/a/x.lnk")].name, "x");
    }

    #[test]
    fn rebuild_preserves_usage_by_default() {
        let temp = TempDir::new().unwrap();
        populate(&temp);
        let store = IndexStore::new(config_for(&temp, UsagePolicy::Preserve));
        store.rebuild();
        let foo = temp.path().join("root/foo.lnk");
        assert!(store.record_launch(&foo));

        let snapshot = store.rebuild();
        assert_eq!(snapshot[&foo].launch_count, 1);
        assert!(snapshot[&foo].last_used > 0);
    }

    #[test]
    fn rebuild_preserves_usage_from_disk_snapshot() {
        let temp = TempDir::new().unwrap();
        populate(&temp);
        let foo = temp.path().join("root/foo.lnk");
        {
            let store = IndexStore::new(config_for(&temp, UsagePolicy::Preserve));
            store.rebuild();
            store.record_launch(&foo);
            store.record_launch(&foo);
        }

        let fresh = IndexStore::new(config_for(&temp, UsagePolicy::Preserve));
        let snapshot = fresh.rebuild();
        assert_eq!(snapshot[&foo].launch_count, 2);
    }

    #[test]
    fn reset_policy_zeroes_usage() {
        let temp = TempDir::new().unwrap();
        populate(&temp);
        let store = IndexStore::new(config_for(&temp, UsagePolicy::Reset));
        store.rebuild();
        let foo = temp.path().join("root/foo.lnk");
        store.record_launch(&foo);

        let snapshot = store.rebuild();
        assert_eq!(snapshot[&foo].launch_count, 0);
        assert_eq!(snapshot[&foo].last_used, 0);
    }

    #[test]
    fn load_or_rebuild_prefers_existing_snapshot() {
        let temp = TempDir::new().unwrap();
        populate(&temp);
        let config = config_for(&temp, UsagePolicy::Preserve);
        let only = Item::new(
            PathBuf::from("/elsewhere/only.lnk"),
            ".lnk".into(),
            ItemKind::Application,
        );
        let mut existing = Snapshot::new();
        existing.insert(only.path.clone(), only);
        assert!(save_snapshot(&config.snapshot_path, &existing));

        let store = IndexStore::new(config);
        let (snapshot, rebuilt) = store.load_or_rebuild();
        assert!(!rebuilt);
        assert_eq!(snapshot, existing);
    }

    #[test]
    fn corrupt_snapshot_falls_back_to_rebuild() {
        let temp = TempDir::new().unwrap();
        populate(&temp);
        let config = config_for(&temp, UsagePolicy::Preserve);
        fs::create_dir_all(config.snapshot_path.parent().unwrap()).unwrap();
        fs::write(&config.snapshot_path, "[{broken").unwrap();
        assert!(load_snapshot(&config.snapshot_path).is_empty());

        let store = IndexStore::new(config);
        let (snapshot, rebuilt) = store.load_or_rebuild();
        assert!(rebuilt);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(load_snapshot(store.snapshot_path()), snapshot);
    }

    #[test]
    fn read_before_load_or_rebuild_still_builds() {
        let temp = TempDir::new().unwrap();
        populate(&temp);
        let store = IndexStore::new(config_for(&temp, UsagePolicy::Preserve));

        assert!(store.snapshot().is_empty());
        assert!(!store.record_launch(&temp.path().join("root/foo.lnk")));

        let (snapshot, rebuilt) = store.load_or_rebuild();
        assert!(rebuilt);
        assert_eq!(snapshot.len(), 2);

        let (again, rebuilt) = store.load_or_rebuild();
        assert!(!rebuilt);
        assert_eq!(again, snapshot);
    }

    #[test]
    fn read_of_corrupt_file_does_not_block_rebuild() {
        let temp = TempDir::new().unwrap();
        populate(&temp);
        let config = config_for(&temp, UsagePolicy::Preserve);
        fs::create_dir_all(config.snapshot_path.parent().unwrap()).unwrap();
        fs::write(&config.snapshot_path, "not json").unwrap();
        let store = IndexStore::new(config);

        assert!(store.items().is_empty());
        let (snapshot, rebuilt) = store.load_or_rebuild();
        assert!(rebuilt);
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn in_memory_state_survives_persistence_failure() {
        let temp = TempDir::new().unwrap();
        populate(&temp);
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let mut config = config_for(&temp, UsagePolicy::Preserve);
        config.snapshot_path = blocker.join("app-index.json");
        let store = IndexStore::new(config);

        let snapshot = store.rebuild();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(store.items().len(), 2);
    }
}
