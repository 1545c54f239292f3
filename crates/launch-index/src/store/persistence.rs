//! Index persistence - durable snapshot read/write.
//!
//! The snapshot is a JSON array of item records overwritten in full on every
//! mutation. Writes go to a temp file in the same directory and are renamed
//! into place, so readers never observe a half-written file.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{IndexError, Result};
use crate::types::{Item, Snapshot};

// ---------------------------------------------------------------------------
// Read operations
// ---------------------------------------------------------------------------

/// Reads the snapshot file.
///
/// Returns `Ok(None)` when the file does not exist. Duplicate paths in the
/// file keep their first record.
pub fn read_snapshot(path: &Path) -> Result<Option<Snapshot>> {
    let input = match File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error.into()),
    };

    let items: Vec<Item> = serde_json::from_reader(BufReader::new(input))?;
    let mut snapshot = Snapshot::new();
    for item in items {
        snapshot.entry(item.path.clone()).or_insert(item);
    }
    Ok(Some(snapshot))
}

/// Loads the snapshot, treating a missing or unreadable file as empty.
pub fn load_snapshot(path: &Path) -> Snapshot {
    match read_snapshot(path) {
        Ok(Some(snapshot)) => {
            log::debug!(
                "loaded index snapshot from {} ({} items)",
                path.display(),
                snapshot.len()
            );
            snapshot
        }
        Ok(None) => Snapshot::new(),
        Err(error) => {
            log::warn!(
                "index snapshot unreadable at {}, using empty index: {}",
                path.display(),
                error
            );
            Snapshot::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Write operations
// ---------------------------------------------------------------------------

/// Writes the snapshot atomically, creating the parent directory if needed.
pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|error| {
        IndexError::Internal(format!(
            "failed to create index directory {}: {error}",
            parent.display()
        ))
    })?;

    let mut temp = NamedTempFile::new_in(parent)?;
    {
        let mut output = BufWriter::new(temp.as_file_mut());
        let items: Vec<&Item> = snapshot.values().collect();
        serde_json::to_writer_pretty(&mut output, &items)?;
        output.flush()?;
    }

    temp.persist(path).map_err(|error| {
        IndexError::Internal(format!(
            "failed to finalize index file {}: {}",
            path.display(),
            error.error
        ))
    })?;

    log::debug!(
        "wrote index snapshot to {} ({} items)",
        path.display(),
        snapshot.len()
    );
    Ok(())
}

/// Writes the snapshot, logging and swallowing any failure.
///
/// Returns whether the write succeeded.
pub fn save_snapshot(path: &Path, snapshot: &Snapshot) -> bool {
    match write_snapshot(path, snapshot) {
        Ok(()) => true,
        Err(error) => {
            log::warn!(
                "failed to write index snapshot {}: {}",
                path.display(),
                error
            );
            false
        }
    }
}
