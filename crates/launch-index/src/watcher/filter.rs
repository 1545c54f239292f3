//! Path scoping and ignore rules for watcher events.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
struct ScopedRoot {
    root: PathBuf,
    /// The root with symlinks resolved, when that differs. Some backends
    /// (FSEvents) report event paths in this form.
    resolved: Option<PathBuf>,
}

impl ScopedRoot {
    fn new(root: PathBuf) -> Self {
        let resolved = fs::canonicalize(&root).ok().filter(|resolved| *resolved != root);
        Self { root, resolved }
    }

    fn relative<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        path.strip_prefix(&self.root).ok().or_else(|| {
            self.resolved
                .as_ref()
                .and_then(|resolved| path.strip_prefix(resolved).ok())
        })
    }
}

/// Decides which event paths are worth scheduling.
#[derive(Debug, Clone)]
pub struct WatchFilter {
    roots: Vec<ScopedRoot>,
    ignored_names: BTreeSet<String>,
    max_depth: usize,
}

impl WatchFilter {
    pub fn new(roots: Vec<PathBuf>, ignored_names: BTreeSet<String>, max_depth: usize) -> Self {
        Self {
            roots: roots.into_iter().map(ScopedRoot::new).collect(),
            ignored_names,
            max_depth,
        }
    }

    /// Maps an event path onto the configured root that owns it.
    ///
    /// Returns `None` when `path` lies outside every root, past the depth
    /// limit, or under a dotfile or ignored name below the root. Paths
    /// reported through a resolved symlink come back under the root as
    /// configured, so they match what the crawl indexed.
    pub fn resolve(&self, path: &Path) -> Option<PathBuf> {
        let (scoped, relative) = self
            .roots
            .iter()
            .filter_map(|scoped| scoped.relative(path).map(|relative| (scoped, relative)))
            .min_by_key(|(_, relative)| relative.components().count())?;

        let mut components = 0usize;
        for component in relative.components() {
            let Component::Normal(name) = component else {
                return None;
            };
            components += 1;
            if self.name_is_ignored(&name.to_string_lossy()) {
                return None;
            }
        }

        // A file directly inside the root is at depth zero.
        if components == 0 || components - 1 > self.max_depth {
            return None;
        }
        Some(scoped.root.join(relative))
    }

    fn name_is_ignored(&self, name: &str) -> bool {
        name.starts_with('.') || self.ignored_names.contains(name)
    }
}

/// True when the directory containing `path` can still be listed.
///
/// Events for paths whose parent vanished are dropped; the parent's own
/// removal event covers them.
pub fn parent_is_accessible(path: &Path) -> bool {
    path.parent()
        .map(|parent| fs::read_dir(parent).is_ok())
        .unwrap_or(false)
}

/// True when the root exists and can be listed.
pub fn root_is_watchable(root: &Path) -> bool {
    root.is_dir() && fs::read_dir(root).is_ok()
}
