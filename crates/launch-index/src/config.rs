//! Index configuration: roots, crawl policies, extension sets and storage.
//!
//! Nothing here is user-facing. `IndexConfig::from_env` derives the
//! platform well-known folders; tests and embedders build configs by hand.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::types::ItemKind;

/// Environment variable overriding the directory that holds the index file.
pub const DATA_DIR_ENV: &str = "LAUNCH_INDEX_DATA_DIR";

/// File name of the durable index inside the data directory.
pub const SNAPSHOT_FILE_NAME: &str = "app-index.json";

/// Quiet period before a batch of watcher events is flushed.
pub const DEFAULT_SETTLE_WINDOW: Duration = Duration::from_millis(700);

/// Events deeper than this below their watch root are ignored.
pub const DEFAULT_WATCH_DEPTH: usize = 6;

const SHORTCUT_SWEEP_DEPTH: usize = 5;
const CONTENT_SWEEP_DEPTH: usize = 3;

const DEFAULT_SHORTCUT_EXTENSIONS: &[&str] = &[".lnk", ".url", ".appref-ms"];

const DEFAULT_DOCUMENT_EXTENSIONS: &[&str] = &[
    ".txt", ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".jpg", ".jpeg", ".png",
    ".gif", ".mp3", ".mp4", ".wav", ".zip", ".rar",
];

const DEFAULT_EXCLUDED_DIRECTORIES: &[&str] = &["node_modules", ".git", "AppData"];

const DEFAULT_IGNORED_NAMES: &[&str] = &["node_modules", "AppData", "Thumbs.db", "desktop.ini"];

const CONTENT_FOLDERS: &[&str] = &[
    "Desktop",
    "Documents",
    "Downloads",
    "Pictures",
    "Music",
    "Videos",
];

/// Per-sweep crawl policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlOptions {
    pub max_depth: usize,
    pub include_non_application_files: bool,
    pub excluded_directory_names: BTreeSet<String>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self::shortcuts()
    }
}

impl CrawlOptions {
    /// Shortcut locations: deeper descent, shortcuts only.
    pub fn shortcuts() -> Self {
        Self {
            max_depth: SHORTCUT_SWEEP_DEPTH,
            include_non_application_files: false,
            excluded_directory_names: to_set(DEFAULT_EXCLUDED_DIRECTORIES),
        }
    }

    /// User content folders: shallower descent, documents and media included.
    pub fn content() -> Self {
        Self {
            max_depth: CONTENT_SWEEP_DEPTH,
            include_non_application_files: true,
            excluded_directory_names: to_set(DEFAULT_EXCLUDED_DIRECTORIES),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// A directory to crawl together with the policy to crawl it with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlRoot {
    pub directory: PathBuf,
    pub options: CrawlOptions,
}

impl CrawlRoot {
    pub fn new(directory: impl Into<PathBuf>, options: CrawlOptions) -> Self {
        Self {
            directory: directory.into(),
            options,
        }
    }
}

/// Recognized extensions, stored lower-cased with a leading dot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionSets {
    pub shortcuts: BTreeSet<String>,
    pub documents: BTreeSet<String>,
}

impl Default for ExtensionSets {
    fn default() -> Self {
        let mut shortcuts = to_set(DEFAULT_SHORTCUT_EXTENSIONS);
        if cfg!(target_os = "linux") {
            shortcuts.insert(".desktop".to_string());
        }
        Self {
            shortcuts,
            documents: to_set(DEFAULT_DOCUMENT_EXTENSIONS),
        }
    }
}

impl ExtensionSets {
    pub fn new<S: AsRef<str>>(shortcuts: &[S], documents: &[S]) -> Self {
        Self {
            shortcuts: shortcuts.iter().map(|ext| normalize_ext(ext.as_ref())).collect(),
            documents: documents.iter().map(|ext| normalize_ext(ext.as_ref())).collect(),
        }
    }

    /// Classifies an already-normalized extension.
    ///
    /// Shortcuts always classify as applications; documents only when
    /// `include_files` is set.
    pub fn classify(&self, extension: &str, include_files: bool) -> Option<ItemKind> {
        if self.shortcuts.contains(extension) {
            Some(ItemKind::Application)
        } else if include_files && self.documents.contains(extension) {
            Some(ItemKind::File)
        } else {
            None
        }
    }

}

/// Whether a full rebuild keeps usage counters for paths already indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsagePolicy {
    #[default]
    Preserve,
    Reset,
}

/// Full configuration of the index service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub snapshot_path: PathBuf,
    pub roots: Vec<CrawlRoot>,
    pub extensions: ExtensionSets,
    pub usage_policy: UsagePolicy,
    #[serde(with = "duration_millis")]
    pub settle_window: Duration,
    pub watch_depth: usize,
    pub ignored_names: BTreeSet<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from(SNAPSHOT_FILE_NAME),
            roots: Vec::new(),
            extensions: ExtensionSets::default(),
            usage_policy: UsagePolicy::default(),
            settle_window: DEFAULT_SETTLE_WINDOW,
            watch_depth: DEFAULT_WATCH_DEPTH,
            ignored_names: to_set(DEFAULT_IGNORED_NAMES),
        }
    }
}

impl IndexConfig {
    /// Creates a config with default policies for the given snapshot location.
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
            ..Self::default()
        }
    }

    pub fn with_root(mut self, root: CrawlRoot) -> Self {
        self.roots.push(root);
        self
    }

    /// Derives the snapshot location and root folders from the environment.
    pub fn from_env() -> Result<Self> {
        let data_dir = match std::env::var_os(DATA_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .map(|dir| dir.join("launch-index"))
                .ok_or_else(|| {
                    IndexError::InvalidInput("unable to resolve a user data directory".into())
                })?,
        };

        let mut config = Self::new(data_dir.join(SNAPSHOT_FILE_NAME));
        for directory in shortcut_directories() {
            config.roots.push(CrawlRoot::new(directory, CrawlOptions::shortcuts()));
        }
        for directory in content_directories() {
            config.roots.push(CrawlRoot::new(directory, CrawlOptions::content()));
        }
        Ok(config)
    }

    /// Loads a JSON config file; absent fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&raw)?;
        config.extensions = ExtensionSets {
            shortcuts: config.extensions.shortcuts.iter().map(|e| normalize_ext(e)).collect(),
            documents: config.extensions.documents.iter().map(|e| normalize_ext(e)).collect(),
        };
        Ok(config)
    }

    /// Directories to watch, deduplicated, in configuration order.
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        let mut seen = BTreeSet::new();
        self.roots
            .iter()
            .filter(|root| seen.insert(root.directory.clone()))
            .map(|root| root.directory.clone())
            .collect()
    }
}

/// Lower-cases an extension and ensures it starts with a dot.
pub fn normalize_ext(extension: &str) -> String {
    let lowered = extension.trim().to_lowercase();
    if lowered.starts_with('.') {
        lowered
    } else {
        format!(".{lowered}")
    }
}

fn to_set(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[cfg(target_os = "windows")]
fn shortcut_directories() -> Vec<PathBuf> {
    const START_MENU: &str = "Microsoft\\Windows\\Start Menu\\Programs";
    let program_data = std::env::var_os("ProgramData")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("C:\\ProgramData"));
    let mut dirs_out = vec![program_data.join(START_MENU)];
    if let Some(roaming) = dirs::data_dir() {
        dirs_out.push(roaming.join(START_MENU));
    }
    dirs_out
}

#[cfg(target_os = "linux")]
fn shortcut_directories() -> Vec<PathBuf> {
    let mut dirs_out = vec![PathBuf::from("/usr/share/applications")];
    if let Some(data) = dirs::data_dir() {
        dirs_out.push(data.join("applications"));
    }
    dirs_out
}

#[cfg(not(any(target_os = "windows", target_os = "linux")))]
fn shortcut_directories() -> Vec<PathBuf> {
    Vec::new()
}

fn content_directories() -> Vec<PathBuf> {
    let known = [
        dirs::desktop_dir(),
        dirs::document_dir(),
        dirs::download_dir(),
        dirs::picture_dir(),
        dirs::audio_dir(),
        dirs::video_dir(),
    ];
    let mut found: Vec<PathBuf> = known.into_iter().flatten().collect();
    if found.is_empty() {
        if let Some(home) = dirs::home_dir() {
            found = CONTENT_FOLDERS.iter().map(|name| home.join(name)).collect();
        }
    }
    found
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
