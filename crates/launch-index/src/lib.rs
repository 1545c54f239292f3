//! Launchable-item index with incremental filesystem synchronization.
//!
//! This crate provides the indexing core of a launcher:
//! - Bounded-depth crawling of shortcut and user content folders
//! - A path-keyed snapshot persisted as a single JSON file
//! - Single-path reconciliation that preserves usage counters
//! - A debounced notify watcher that keeps the snapshot current

pub mod config;
pub mod crawler;
pub mod error;
pub mod reconcile;
pub mod service;
pub mod store;
pub mod types;
pub mod watcher;

// Re-export main types
pub use config::{CrawlOptions, CrawlRoot, ExtensionSets, IndexConfig, UsagePolicy};
pub use crawler::crawl;
pub use error::{IndexError, Result};
pub use reconcile::PathReconciler;
pub use service::{IndexService, LaunchOutcome, Launcher, SystemLauncher};
pub use store::{load_snapshot, save_snapshot, IndexStore};
pub use types::{IndexStats, Item, ItemKind, Snapshot};
pub use watcher::{start_watching, WatchHandle, WatchOptions};
