//! Index record types shared by the crawler, the store and the watcher.
//!
//! Field names on the wire match the durable index file:
//! `{name, file, ext, type, launchCount, lastUsed, size?, mtime?}`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Classification of an indexed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// A launchable shortcut (`.lnk`, `.url`, ...).
    Application,
    /// A document or media file found under a user content root.
    File,
}

/// One indexed filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    #[serde(rename = "file")]
    pub path: PathBuf,
    #[serde(rename = "ext")]
    pub extension: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[serde(rename = "launchCount", default)]
    pub launch_count: u64,
    /// Unix milliseconds of the last launch, zero when never launched.
    #[serde(rename = "lastUsed", default)]
    pub last_used: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Unix milliseconds of the last modification seen at reconcile time.
    #[serde(rename = "mtime", default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<u64>,
}

impl Item {
    /// Creates a record with zeroed usage metadata and no stat data.
    pub fn new(path: PathBuf, extension: String, kind: ItemKind) -> Self {
        Self {
            name: display_name(&path),
            path,
            extension,
            kind,
            launch_count: 0,
            last_used: 0,
            size: None,
            modified_time: None,
        }
    }

    /// Copies usage counters from a previous record for the same path.
    pub fn with_usage_from(mut self, previous: Option<&Item>) -> Self {
        if let Some(previous) = previous {
            self.launch_count = previous.launch_count;
            self.last_used = previous.last_used;
        }
        self
    }
}

/// Path-keyed collection of items.
pub type Snapshot = BTreeMap<PathBuf, Item>;

/// Filename without its extension.
pub fn display_name(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Lower-cased extension with its leading dot, or an empty string.
pub fn normalized_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Returns the current Unix timestamp in milliseconds.
pub fn unix_now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_millis() as u64)
        .unwrap_or(0)
}

/// Converts a filesystem timestamp to Unix milliseconds, zero on failure.
pub fn system_time_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|value| value.as_millis() as u64)
        .unwrap_or(0)
}

/// Aggregate counts over a snapshot, logged after rebuilds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub total: usize,
    pub applications: usize,
    pub files: usize,
    pub by_extension: BTreeMap<String, usize>,
}

impl IndexStats {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut stats = Self::default();
        for item in snapshot.values() {
            stats.total += 1;
            match item.kind {
                ItemKind::Application => stats.applications += 1,
                ItemKind::File => stats.files += 1,
            }
            *stats.by_extension.entry(item.extension.clone()).or_default() += 1;
        }
        stats
    }
}
