//! Scan workers: expand one directory at a time
//!
//! A worker lists its directory exactly once, without recursing. Children
//! that are directories go back onto the directory queue, files go onto the
//! file queue, and anything else is recorded as skipped.

use log::{debug, trace, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::thread::{self, Scope, ScopedJoinHandle};

use crate::error::SkipRecord;
use crate::fs::{DirEntry, EntryKind, FileSystem};
use crate::manager::Pipeline;

/// One directory listing split by entry kind
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Listing {
    /// Subdirectories, in listing order
    pub folders: Vec<PathBuf>,
    /// Files, in listing order
    pub files: Vec<PathBuf>,
    /// Entries that are neither
    pub skipped: Vec<SkipRecord>,
}

impl Listing {
    /// Split raw directory entries by kind
    pub fn from_entries(entries: Vec<DirEntry>) -> Self {
        let mut listing = Listing::default();
        for entry in entries {
            match entry.kind {
                EntryKind::Directory => listing.folders.push(entry.path),
                EntryKind::File => listing.files.push(entry.path),
                EntryKind::Other(reason) => {
                    trace!("Skipping {:?}: {}", entry.path, reason);
                    listing
                        .skipped
                        .push(SkipRecord::unsupported(entry.path, reason));
                }
            }
        }
        listing
    }
}

/// Start `count` scan workers inside `scope`
///
/// On a spawn failure the workers already started are told to stop.
pub(crate) fn spawn_workers<'scope, F>(
    scope: &'scope Scope<'scope, '_>,
    count: usize,
    fs: &'scope F,
    pipeline: &'scope Pipeline,
) -> io::Result<Vec<ScopedJoinHandle<'scope, ()>>>
where
    F: FileSystem + ?Sized,
{
    let mut handles = Vec::with_capacity(count);
    for id in 0..count {
        let spawned = thread::Builder::new()
            .name(format!("scan-{}", id))
            .spawn_scoped(scope, move || scan_worker(id, fs, pipeline));
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                warn!("Failed to spawn scan worker {}: {}", id, err);
                pipeline.dirs.stop(handles.len());
                return Err(err);
            }
        }
    }
    Ok(handles)
}

fn scan_worker<F: FileSystem + ?Sized>(id: usize, fs: &F, pipeline: &Pipeline) {
    debug!("scan worker {} started", id);
    let mut listed = 0u64;

    while let Some(dir) = pipeline.dirs.pop() {
        // Dropping the claim completes the item without expanding it
        if pipeline.is_cancelled() {
            continue;
        }
        scan_directory(fs, dir.item(), pipeline);
        listed += 1;
    }

    debug!("scan worker {} exiting after {} directories", id, listed);
}

/// List `dir` once and feed its children into the pipeline
pub(crate) fn scan_directory<F: FileSystem + ?Sized>(fs: &F, dir: &Path, pipeline: &Pipeline) {
    let entries = match fs.list_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("Cannot list {:?}: {}", dir, err);
            pipeline
                .store
                .record_skips(vec![SkipRecord::inaccessible_directory(dir.to_path_buf(), &err)]);
            return;
        }
    };

    let Listing {
        folders,
        files,
        skipped,
    } = Listing::from_entries(entries);
    trace!(
        "{:?}: {} folders, {} files, {} skipped",
        dir,
        folders.len(),
        files.len(),
        skipped.len()
    );

    pipeline.store.append_folders(&folders);
    pipeline.dirs.push_all(folders);
    pipeline.store.append_files(&files);
    pipeline.files.push_all(files);
    pipeline.store.record_skips(skipped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SkipKind;
    use crate::fs::LocalFs;
    use std::fs::{self, File};
    use tempfile::TempDir;

    #[test]
    fn test_listing_splits_by_kind() {
        let listing = Listing::from_entries(vec![
            DirEntry::new(PathBuf::from("/r/a"), EntryKind::Directory),
            DirEntry::new(PathBuf::from("/r/b.txt"), EntryKind::File),
            DirEntry::new(PathBuf::from("/r/c"), EntryKind::File),
            DirEntry::new(PathBuf::from("/r/sock"), EntryKind::Other("socket".into())),
        ]);

        assert_eq!(listing.folders, vec![PathBuf::from("/r/a")]);
        assert_eq!(
            listing.files,
            vec![PathBuf::from("/r/b.txt"), PathBuf::from("/r/c")]
        );
        assert_eq!(listing.skipped.len(), 1);
        assert_eq!(listing.skipped[0].kind, SkipKind::UnsupportedEntry);
    }

    #[test]
    fn test_scan_directory_feeds_both_queues() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        File::create(tmp.path().join("one.txt")).unwrap();
        File::create(tmp.path().join("two.rs")).unwrap();

        let pipeline = Pipeline::new(tmp.path().to_path_buf());
        scan_directory(&LocalFs, tmp.path(), &pipeline);

        assert_eq!(pipeline.dirs.outstanding(), 1);
        assert_eq!(pipeline.files.outstanding(), 2);
        let counts = pipeline.store.counts();
        assert_eq!(counts.folders, 1);
        assert_eq!(counts.files, 2);
    }

    #[test]
    fn test_unlistable_directory_is_recorded() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("gone");

        let pipeline = Pipeline::new(tmp.path().to_path_buf());
        scan_directory(&LocalFs, &missing, &pipeline);

        let mapping = pipeline.store.take_mapping();
        assert_eq!(mapping.skipped.len(), 1);
        assert_eq!(mapping.skipped[0].kind, SkipKind::InaccessibleDirectory);
        assert_eq!(mapping.skipped[0].path, missing);
        assert_eq!(pipeline.dirs.outstanding(), 0);
    }
}
