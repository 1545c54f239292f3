//! Incremental reconciliation of single-path changes into the store.

use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::store::IndexStore;
use crate::types::{normalized_extension, system_time_millis, unix_now_millis, Item};

/// Applies single-path changes to an index.
///
/// The watcher flushes through this trait so the store can be swapped out.
pub trait PathReconciler: Send + Sync {
    /// Adds or refreshes the record for `path`. Returns whether anything changed.
    fn reconcile_add(&self, path: &Path) -> Result<bool>;

    /// Removes the record for `path`. Returns whether anything changed.
    fn reconcile_remove(&self, path: &Path) -> Result<bool>;
}

impl PathReconciler for IndexStore {
    fn reconcile_add(&self, path: &Path) -> Result<bool> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => return Ok(false),
        };

        let extension = normalized_extension(path);
        let Some(kind) = self.config().extensions.classify(&extension, true) else {
            return Ok(false);
        };

        let mut item = Item::new(path.to_path_buf(), extension, kind);
        item.size = Some(metadata.len());
        item.modified_time = Some(metadata.modified().map(system_time_millis).unwrap_or(0));

        self.mutate(|snapshot| {
            let item = item.with_usage_from(snapshot.get(path));
            snapshot.insert(path.to_path_buf(), item);
            ((), true)
        });
        log::debug!("reconciled add path={}", path.display());
        Ok(true)
    }

    fn reconcile_remove(&self, path: &Path) -> Result<bool> {
        let vanished = fs::symlink_metadata(path).is_err();
        let removed = self.mutate(|snapshot| {
            let mut removed = usize::from(snapshot.remove(path).is_some());
            if vanished {
                let before = snapshot.len();
                snapshot.retain(|key, _| !key.starts_with(path));
                removed += before - snapshot.len();
            }
            (removed, removed > 0)
        });

        if removed > 0 {
            log::debug!(
                "reconciled remove path={} removed={}",
                path.display(),
                removed
            );
        }
        Ok(removed > 0)
    }
}

impl IndexStore {
    /// Records a successful launch of `path`.
    ///
    /// Unknown paths are a silent no-op and return false.
    pub fn record_launch(&self, path: &Path) -> bool {
        self.mutate(|snapshot| match snapshot.get_mut(path) {
            Some(item) => {
                item.launch_count = item.launch_count.saturating_add(1);
                item.last_used = unix_now_millis();
                (true, true)
            }
            None => (false, false),
        })
    }
}
