//! Bounded-depth directory crawling.
//!
//! Each root is walked with an explicit worklist rather than recursion so a
//! pathological tree cannot exhaust the call stack. Roots are crawled in
//! parallel and their results concatenated in root order.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::config::{CrawlOptions, CrawlRoot, ExtensionSets};
use crate::types::{normalized_extension, Item};

/// Counters collected while crawling, for logging.
#[derive(Debug, Default)]
pub struct CrawlProgress {
    pub scanned_dirs: AtomicUsize,
    pub scanned_files: AtomicUsize,
    pub errors: AtomicUsize,
}

/// Crawls every root and returns the matching items in root order.
///
/// Duplicates across roots are kept; the store drops them on merge.
pub fn crawl(roots: &[CrawlRoot], extensions: &ExtensionSets) -> Vec<Item> {
    let progress = CrawlProgress::default();
    let per_root: Vec<Vec<Item>> = roots
        .par_iter()
        .map(|root| crawl_root(&root.directory, &root.options, extensions, &progress))
        .collect();

    log::debug!(
        "crawl finished roots={} dirs={} files={} errors={}",
        roots.len(),
        progress.scanned_dirs.load(Ordering::Relaxed),
        progress.scanned_files.load(Ordering::Relaxed),
        progress.errors.load(Ordering::Relaxed),
    );

    per_root.into_iter().flatten().collect()
}

/// Crawls a single root directory.
///
/// A directory at depth `d` (the root is depth 0) is read only when
/// `d <= max_depth`. Unreadable directories are logged and treated as empty.
pub fn crawl_root(
    root: &Path,
    options: &CrawlOptions,
    extensions: &ExtensionSets,
    progress: &CrawlProgress,
) -> Vec<Item> {
    let mut results = Vec::new();

    if !root.is_dir() {
        log::debug!("crawl root skipped, not a directory: {}", root.display());
        return results;
    }

    let mut worklist: Vec<(PathBuf, usize)> = vec![(root.to_path_buf(), 0)];
    while let Some((dir, depth)) = worklist.pop() {
        if depth > options.max_depth {
            continue;
        }

        let read_dir = match fs::read_dir(&dir) {
            Ok(iter) => iter,
            Err(error) => {
                progress.errors.fetch_add(1, Ordering::Relaxed);
                log::warn!("failed to read directory {}: {}", dir.display(), error);
                continue;
            }
        };
        progress.scanned_dirs.fetch_add(1, Ordering::Relaxed);

        for entry in read_dir {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    progress.errors.fetch_add(1, Ordering::Relaxed);
                    log::warn!("failed to read entry in {}: {}", dir.display(), error);
                    continue;
                }
            };
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let path = entry.path();

            if file_type.is_dir() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if options.excluded_directory_names.contains(&*name) {
                    continue;
                }
                worklist.push((path, depth + 1));
                continue;
            }

            progress.scanned_files.fetch_add(1, Ordering::Relaxed);
            let extension = normalized_extension(&path);
            if let Some(kind) =
                extensions.classify(&extension, options.include_non_application_files)
            {
                results.push(Item::new(path, extension, kind));
            }
        }
    }

    results
}
