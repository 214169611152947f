//! Shared collections filled by the workers during a run
//!
//! Each collection sits behind its own lock. Callers pass fully prepared
//! batches in, so no I/O happens while a lock is held, and no method takes
//! more than one collection lock at a time.

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::SkipRecord;
use crate::models::{ExtensionKey, FileEntry, Mapping};

/// Counts sampled for progress reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    /// Folders appended
    pub folders: usize,
    /// Files appended
    pub files: usize,
    /// Files inserted into the extension index
    pub classified: u64,
    /// Skip records collected
    pub skipped: usize,
}

/// Collections owned by the manager for the duration of one run
#[derive(Debug)]
pub struct MapStore {
    root: PathBuf,
    folders: Mutex<Vec<PathBuf>>,
    files: Mutex<Vec<PathBuf>>,
    extensions: Mutex<IndexMap<ExtensionKey, Vec<FileEntry>>>,
    skipped: Mutex<Vec<SkipRecord>>,
    classified: AtomicU64,
}

impl MapStore {
    /// Create empty collections for a run rooted at `root`
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            folders: Mutex::new(Vec::new()),
            files: Mutex::new(Vec::new()),
            extensions: Mutex::new(IndexMap::new()),
            skipped: Mutex::new(Vec::new()),
            classified: AtomicU64::new(0),
        }
    }

    /// Root of the run
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Append discovered directories, keeping their order
    pub fn append_folders(&self, folders: &[PathBuf]) {
        if folders.is_empty() {
            return;
        }
        self.folders.lock().extend_from_slice(folders);
    }

    /// Append discovered files, keeping their order
    pub fn append_files(&self, files: &[PathBuf]) {
        if files.is_empty() {
            return;
        }
        self.files.lock().extend_from_slice(files);
    }

    /// Insert one classified file into its bucket, creating the bucket if needed
    pub fn insert_classified(&self, entry: FileEntry) {
        {
            let mut index = self.extensions.lock();
            index.entry(entry.extension.clone()).or_default().push(entry);
        }
        self.classified.fetch_add(1, Ordering::Relaxed);
    }

    /// Record paths that were not indexed
    pub fn record_skips(&self, records: Vec<SkipRecord>) {
        if records.is_empty() {
            return;
        }
        self.skipped.lock().extend(records);
    }

    /// Sample the current sizes of the collections
    pub fn counts(&self) -> StoreCounts {
        StoreCounts {
            folders: self.folders.lock().len(),
            files: self.files.lock().len(),
            classified: self.classified.load(Ordering::Relaxed),
            skipped: self.skipped.lock().len(),
        }
    }

    /// Move the collected results out into a [`Mapping`], leaving the store empty
    ///
    /// Only called once every worker of the run has exited.
    pub fn take_mapping(&self) -> Mapping {
        let folders = std::mem::take(&mut *self.folders.lock());
        let files = std::mem::take(&mut *self.files.lock())
            .into_iter()
            .map(FileEntry::new)
            .collect();
        let extensions = std::mem::take(&mut *self.extensions.lock());
        let skipped = std::mem::take(&mut *self.skipped.lock());

        Mapping {
            root: self.root.clone(),
            folders,
            files,
            extensions,
            skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_appends_keep_batch_order() {
        let store = MapStore::new(PathBuf::from("/r"));
        store.append_folders(&[PathBuf::from("/r/b"), PathBuf::from("/r/a")]);
        store.append_files(&[PathBuf::from("/r/z.txt"), PathBuf::from("/r/y")]);

        let mapping = store.take_mapping();
        assert_eq!(
            mapping.folders,
            vec![PathBuf::from("/r/b"), PathBuf::from("/r/a")]
        );
        assert_eq!(mapping.files[0].path, PathBuf::from("/r/z.txt"));
        assert_eq!(mapping.files[1].extension, ExtensionKey::Unknown);
    }

    #[test]
    fn test_concurrent_first_inserts_share_one_bucket() {
        let store = MapStore::new(PathBuf::from("/r"));

        thread::scope(|s| {
            for worker in 0..8 {
                let store = &store;
                s.spawn(move || {
                    for i in 0..250 {
                        let path = PathBuf::from(format!("/r/{}-{}.log", worker, i));
                        store.insert_classified(FileEntry::new(path));
                    }
                });
            }
        });

        assert_eq!(store.counts().classified, 2000);
        let mapping = store.take_mapping();
        assert_eq!(mapping.extension_count(), 1);
        assert_eq!(mapping.bucket(&ExtensionKey::Known("log".into())).len(), 2000);
    }

    #[test]
    fn test_counts_track_skips() {
        let store = MapStore::new(PathBuf::from("/r"));
        store.record_skips(vec![SkipRecord::unsupported(
            PathBuf::from("/r/sock"),
            "socket",
        )]);
        store.record_skips(Vec::new());

        let counts = store.counts();
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.folders, 0);
    }
}
