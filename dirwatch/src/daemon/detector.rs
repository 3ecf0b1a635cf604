//! Change detection over one directory's immediate entries.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs::{metadata, read_dir};
use tracing::{debug, warn};

/// A regular file as seen by one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStamp {
    pub name: String,
    pub path: PathBuf,
    pub modified: SystemTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// No previous observation of this file name.
    New,
    /// Seen before with a different modification time.
    Modified,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    pub file: FileStamp,
    pub change: Change,
}

/// Files deemed changed by one scan, in listing order.
pub type ChangeSet = Vec<ChangedFile>;

/// Last seen modification time per file name.
///
/// Entries are never removed: a deleted file keeps its stale entry for the
/// lifetime of the state.
#[derive(Debug, Default)]
pub struct WatchState {
    seen: HashMap<String, SystemTime>,
}

impl WatchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one observation and record its timestamp.
    pub fn observe(&mut self, name: &str, modified: SystemTime) -> Change {
        match self.seen.get_mut(name) {
            None => {
                self.seen.insert(name.to_string(), modified);
                Change::New
            }
            Some(last) if *last != modified => {
                *last = modified;
                Change::Modified
            }
            Some(_) => Change::Unchanged,
        }
    }

    pub fn detect(&mut self, listing: Vec<FileStamp>) -> ChangeSet {
        listing
            .into_iter()
            .filter_map(|file| match self.observe(&file.name, file.modified) {
                Change::Unchanged => None,
                change => Some(ChangedFile { file, change }),
            })
            .collect()
    }

    pub fn last_seen(&self, name: &str) -> Option<SystemTime> {
        self.seen.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// List the regular files directly inside `dir`, sorted by name.
///
/// Symlinks are followed for the file test, so a link to a regular file is
/// listed and a link to a directory or a dangling link is not.
pub async fn list_regular_files<P: AsRef<Path>>(dir: P) -> io::Result<Vec<FileStamp>> {
    let mut entries = read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let meta = match metadata(&path).await {
            Ok(m) => m,
            Err(e) => {
                debug!("Skipping {path:?}: {e}");
                continue;
            }
        };
        if !meta.is_file() {
            continue;
        }

        let name = match entry.file_name().into_string() {
            Ok(n) => n,
            Err(raw) => {
                warn!("Skipping {raw:?}: file name is not valid utf8");
                continue;
            }
        };
        let modified = match meta.modified() {
            Ok(t) => t,
            Err(e) => {
                warn!("Skipping {path:?}: modification time unavailable: {e}");
                continue;
            }
        };
        files.push(FileStamp {
            name,
            path,
            modified,
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}
