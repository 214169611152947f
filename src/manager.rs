//! Index manager: owns the mapping and orchestrates mapping runs
//!
//! A run seeds the directory queue with the root, starts both worker pools
//! inside a thread scope, and blocks on the directory barrier and then the
//! file barrier. Once the directory stage has drained no new files can
//! appear, so the file barrier reaching zero means the whole run is done.

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ScopedJoinHandle};
use std::time::Instant;

use crate::barrier::BarrierWait;
use crate::classifier::{self, lookup_keys};
use crate::config::MapConfig;
use crate::db::MapDatabase;
use crate::error::{CancelReason, MappingError, Result, SkipKind, SkipRecord};
use crate::export::{self, ListSink};
use crate::fs::{FileSystem, LocalFs};
use crate::models::{ExtensionKey, FileEntry, FolderContents, MapState, Mapping};
use crate::progress::{MapPhase, MapProgress, ProgressReporter};
use crate::queue::WorkQueue;
use crate::scanner;
use crate::snapshot;
use crate::store::MapStore;

/// Queues and collections shared by the workers of one run
#[derive(Debug)]
pub(crate) struct Pipeline {
    pub(crate) dirs: WorkQueue<PathBuf>,
    pub(crate) files: WorkQueue<PathBuf>,
    pub(crate) store: MapStore,
    cancelled: AtomicBool,
}

impl Pipeline {
    pub(crate) fn new(root: PathBuf) -> Self {
        Self {
            dirs: WorkQueue::new(),
            files: WorkQueue::new(),
            store: MapStore::new(root),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Whether workers should drop items instead of processing them
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Stop expanding work and wake the orchestrator
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.dirs.barrier().interrupt();
        self.files.barrier().interrupt();
    }

    fn progress(&self, started: Instant) -> MapProgress {
        let counts = self.store.counts();
        MapProgress {
            folders: counts.folders as u64,
            files: counts.files as u64,
            classified: counts.classified,
            pending_dirs: self.dirs.outstanding() as u64,
            pending_files: self.files.outstanding() as u64,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: MapState,
    mapping: Option<Arc<Mapping>>,
    active: Option<Arc<Pipeline>>,
}

/// Builds, holds and queries a mapping of one directory tree
///
/// All operations take `&self`; the manager can be shared across threads so
/// that [`IndexManager::cancel`] can stop a run blocked in
/// [`IndexManager::createmap`].
pub struct IndexManager<F: FileSystem = LocalFs> {
    fs: F,
    config: MapConfig,
    inner: Mutex<Inner>,
    skipped: Mutex<Vec<SkipRecord>>,
}

impl Default for IndexManager<LocalFs> {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexManager<LocalFs> {
    /// Create a manager over the local filesystem with the default config
    pub fn new() -> Self {
        Self::with_config(MapConfig::default())
    }

    /// Create a manager over the local filesystem
    pub fn with_config(config: MapConfig) -> Self {
        Self::with_fs(LocalFs, config)
    }
}

impl<F: FileSystem> IndexManager<F> {
    /// Create a manager over a custom filesystem layer
    pub fn with_fs(fs: F, config: MapConfig) -> Self {
        Self {
            fs,
            config,
            inner: Mutex::new(Inner::default()),
            skipped: Mutex::new(Vec::new()),
        }
    }

    /// The manager's configuration
    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> MapState {
        self.inner.lock().state
    }

    /// Map the tree under `root`
    ///
    /// Thread counts of 0 fall back to the configured values. Blocks until
    /// every directory has been listed and every file classified, or until
    /// the run is cancelled, in which case the state becomes
    /// [`MapState::Partial`] and [`MappingError::Cancelled`] is returned.
    pub fn createmap(
        &self,
        root: impl AsRef<Path>,
        scan_threads: usize,
        classify_threads: usize,
    ) -> Result<Arc<Mapping>> {
        {
            let mut inner = self.inner.lock();
            if inner.state != MapState::Unmapped {
                return Err(MappingError::AlreadyMapped);
            }
            inner.state = MapState::Mapping;
        }

        let root = match self.resolve_root(root.as_ref()) {
            Ok(root) => root,
            Err(err) => {
                self.inner.lock().state = MapState::Unmapped;
                return Err(err);
            }
        };

        let scan_threads = match scan_threads {
            0 => self.config.effective_scan_threads(),
            n => n,
        };
        let classify_threads = match classify_threads {
            0 => self.config.effective_classify_threads(),
            n => n,
        };

        let pipeline = Arc::new(Pipeline::new(root.clone()));
        self.inner.lock().active = Some(Arc::clone(&pipeline));

        info!(
            "Mapping {:?} with {} scan and {} classify workers",
            root, scan_threads, classify_threads
        );
        let started = Instant::now();
        let reporter = ProgressReporter::new(self.config.show_progress, self.config.progress_interval_ms);
        reporter.report_start(&root, scan_threads, classify_threads);

        pipeline.dirs.push(root.clone());
        let outcome = self.run(&pipeline, scan_threads, classify_threads, &reporter, started);
        self.finish(&pipeline, outcome, &reporter, started)
    }

    /// Settle the state once every worker of the run has exited
    ///
    /// Only the outcome of the wait decides between `Mapped` and `Partial`.
    /// A cancel that arrives after both stages drained changes nothing.
    fn finish(
        &self,
        pipeline: &Pipeline,
        outcome: io::Result<Option<CancelReason>>,
        reporter: &ProgressReporter,
        started: Instant,
    ) -> Result<Arc<Mapping>> {
        let root = pipeline.store.root();
        let mapping = pipeline.store.take_mapping();
        let duration_ms = started.elapsed().as_millis() as u64;
        reporter.report_skips(&mapping.skipped);

        let mut inner = self.inner.lock();
        inner.active = None;

        let reason = match outcome {
            Ok(reason) => reason,
            Err(err) => {
                error!("Failed to start workers for {:?}: {}", root, err);
                inner.state = MapState::Unmapped;
                return Err(err.into());
            }
        };

        *self.skipped.lock() = mapping.skipped.clone();

        match reason {
            None => {
                info!(
                    "Mapped {:?}: {} folders, {} files, {} extensions, {} skipped in {} ms",
                    root,
                    mapping.folder_count(),
                    mapping.file_count(),
                    mapping.extension_count(),
                    mapping.skipped.len(),
                    duration_ms
                );
                reporter.report_done(MapState::Mapped, &mapping, duration_ms);

                let mapping = Arc::new(mapping);
                inner.state = MapState::Mapped;
                inner.mapping = Some(Arc::clone(&mapping));
                Ok(mapping)
            }
            Some(reason) => {
                warn!(
                    "Mapping of {:?} stopped ({}) after {} folders and {} files",
                    root,
                    reason,
                    mapping.folder_count(),
                    mapping.file_count()
                );
                reporter.report_done(MapState::Partial, &mapping, duration_ms);

                let (folders, files) = (mapping.folder_count(), mapping.file_count());
                inner.state = MapState::Partial;
                inner.mapping = Some(Arc::new(mapping));
                Err(MappingError::Cancelled { reason, folders, files })
            }
        }
    }

    /// Stop an in-progress run
    ///
    /// Returns false when no run is active.
    pub fn cancel(&self) -> bool {
        match &self.inner.lock().active {
            Some(pipeline) => {
                info!("Cancelling mapping of {:?}", pipeline.store.root());
                pipeline.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop the current mapping
    ///
    /// Fails with `NotMapped` when there is nothing to drop and with
    /// `InProgress` while a run is active.
    pub fn unmap(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            MapState::Unmapped => Err(MappingError::NotMapped),
            MapState::Mapping => Err(MappingError::InProgress),
            MapState::Mapped | MapState::Partial => {
                debug!("Dropping {} mapping", inner.state);
                inner.state = MapState::Unmapped;
                inner.mapping = None;
                self.skipped.lock().clear();
                Ok(())
            }
        }
    }

    /// Like [`IndexManager::unmap`], but succeeds when already unmapped
    pub fn reset(&self) -> Result<()> {
        match self.unmap() {
            Err(MappingError::NotMapped) => Ok(()),
            other => other,
        }
    }

    /// The complete mapping
    pub fn mapping(&self) -> Result<Arc<Mapping>> {
        let inner = self.inner.lock();
        match (inner.state, &inner.mapping) {
            (MapState::Mapped, Some(mapping)) => Ok(Arc::clone(mapping)),
            _ => Err(MappingError::NotMapped),
        }
    }

    /// What a stopped run collected before it stopped
    ///
    /// Only available in [`MapState::Partial`]. Folders and files discovered
    /// before the stop are listed, but files still queued for classification
    /// are missing from the buckets.
    pub fn partial_mapping(&self) -> Result<Arc<Mapping>> {
        let inner = self.inner.lock();
        match (inner.state, &inner.mapping) {
            (MapState::Partial, Some(mapping)) => Ok(Arc::clone(mapping)),
            _ => Err(MappingError::NotMapped),
        }
    }

    /// Folders beneath the root, in discovery order
    pub fn folders(&self) -> Result<Vec<PathBuf>> {
        Ok(self.mapping()?.folders.clone())
    }

    /// Files beneath the root, in discovery order
    pub fn files(&self) -> Result<Vec<FileEntry>> {
        Ok(self.mapping()?.files.clone())
    }

    /// The mapped folder at `path`, if there is one
    ///
    /// A relative path is taken relative to the root. The root itself is found.
    pub fn find_folder(&self, path: impl AsRef<Path>) -> Result<Option<PathBuf>> {
        let mapping = self.mapping()?;
        let path = mapping.root.join(path);
        if path == mapping.root {
            return Ok(Some(mapping.root.clone()));
        }
        Ok(mapping.folders.iter().find(|folder| **folder == path).cloned())
    }

    /// Files whose name is exactly `name`, in discovery order
    pub fn files_named(&self, name: impl AsRef<OsStr>) -> Result<Vec<FileEntry>> {
        let mapping = self.mapping()?;
        let name = name.as_ref();
        Ok(mapping
            .files
            .iter()
            .filter(|entry| entry.path.file_name() == Some(name))
            .cloned()
            .collect())
    }

    /// Immediate subfolders and files of a mapped folder, in discovery order
    ///
    /// A relative path is taken relative to the root. Fails with `NotIndexed`
    /// when `folder` is neither the root nor a mapped folder.
    pub fn folder_contents(&self, folder: impl AsRef<Path>) -> Result<FolderContents> {
        let mapping = self.mapping()?;
        let folder = mapping.root.join(folder);
        if folder != mapping.root && !mapping.folders.contains(&folder) {
            return Err(MappingError::NotIndexed(folder));
        }

        let in_folder = |path: &Path| path.parent() == Some(folder.as_path());
        Ok(FolderContents {
            folders: mapping
                .folders
                .iter()
                .filter(|path| in_folder(path.as_path()))
                .cloned()
                .collect(),
            files: mapping
                .files
                .iter()
                .filter(|entry| in_folder(entry.path()))
                .cloned()
                .collect(),
        })
    }

    /// Current on-disk size of one indexed file
    ///
    /// A relative path is taken relative to the root. Fails with `NotIndexed`
    /// for paths the mapping does not list as files.
    pub fn size_of(&self, path: impl AsRef<Path>) -> Result<u64> {
        let mapping = self.mapping()?;
        let path = mapping.root.join(path);
        if !mapping.files.iter().any(|entry| entry.path == path) {
            return Err(MappingError::NotIndexed(path));
        }
        Ok(self.fs.stat_size(&path)?)
    }

    /// Paths skipped by the last run and by size queries since
    pub fn skipped(&self) -> Vec<SkipRecord> {
        self.skipped.lock().clone()
    }

    /// Files whose extension matches any of `exts`
    ///
    /// A leading `.` is ignored and an empty extension selects the
    /// `UNKNOWN` bucket. Without `case_sensitive`, the lower- and upper-case
    /// forms of each extension are looked up. Each bucket is returned at
    /// most once, in the order it was first requested.
    pub fn query_by_extension<S: AsRef<str>>(&self, exts: &[S], case_sensitive: bool) -> Result<Vec<FileEntry>> {
        let mapping = self.mapping()?;
        Ok(matching_buckets(&mapping, exts, case_sensitive)
            .into_iter()
            .flat_map(|bucket| bucket.iter().cloned())
            .collect())
    }

    /// Number of files [`IndexManager::query_by_extension`] would return
    pub fn count_by_extension<S: AsRef<str>>(&self, exts: &[S], case_sensitive: bool) -> Result<usize> {
        let mapping = self.mapping()?;
        Ok(matching_buckets(&mapping, exts, case_sensitive)
            .iter()
            .map(|bucket| bucket.len())
            .sum())
    }

    /// Bucket keys with their sizes, in bucket creation order
    pub fn extension_counts(&self) -> Result<Vec<(ExtensionKey, usize)>> {
        let mapping = self.mapping()?;
        Ok(mapping
            .extensions
            .iter()
            .map(|(key, entries)| (key.clone(), entries.len()))
            .collect())
    }

    /// Sum of the current on-disk sizes of every indexed file
    ///
    /// Files that can no longer be stat'ed count as 0 and are added to the
    /// skip list.
    pub fn total_size(&self) -> Result<u64> {
        let mapping = self.mapping()?;
        let fs = &self.fs;

        let (total, failures) = mapping
            .files
            .par_iter()
            .fold(
                || (0u64, Vec::new()),
                |(mut total, mut failures), entry| {
                    match fs.stat_size(&entry.path) {
                        Ok(size) => total += size,
                        Err(err) => {
                            debug!("Cannot stat {:?}: {}", entry.path, err);
                            failures.push(SkipRecord::inaccessible_file(entry.path.clone(), &err));
                        }
                    }
                    (total, failures)
                },
            )
            .reduce(
                || (0u64, Vec::new()),
                |(a, mut failures), (b, more)| {
                    failures.extend(more);
                    (a + b, failures)
                },
            );

        if !failures.is_empty() {
            warn!("{} indexed files could not be stat'ed", failures.len());
            let mut skipped = self.skipped.lock();
            let mut known: HashSet<(SkipKind, PathBuf)> =
                skipped.iter().map(|r| (r.kind, r.path.clone())).collect();
            for record in failures {
                if known.insert((record.kind, record.path.clone())) {
                    skipped.push(record);
                }
            }
        }

        Ok(total)
    }

    /// Serialize the mapping into snapshot bytes
    pub fn export_map(&self) -> Result<Vec<u8>> {
        let mapping = self.mapping()?;
        snapshot::encode(&mapping)
    }

    /// Install a mapping from snapshot bytes
    pub fn import_map(&self, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != MapState::Unmapped {
            return Err(MappingError::AlreadyMapped);
        }
        let snapshot = snapshot::decode(bytes)?;
        debug!("Importing snapshot created at {}", snapshot.created_at);
        self.install(&mut inner, snapshot.mapping);
        Ok(())
    }

    /// Write every file matching `predicate` to `sink`
    ///
    /// Returns the number of paths written.
    pub fn export_filtered<P, S>(&self, predicate: P, sink: &mut S) -> Result<usize>
    where
        P: Fn(&FileEntry) -> bool,
        S: ListSink + ?Sized,
    {
        let mapping = self.mapping()?;
        let paths: Vec<&Path> = mapping
            .files
            .iter()
            .filter(|entry| predicate(entry))
            .map(FileEntry::path)
            .collect();
        sink.write_list(&paths)?;
        Ok(paths.len())
    }

    /// Write folders, files and extension buckets as text
    pub fn export_summary<W: Write>(&self, writer: W, numbered: bool) -> Result<()> {
        let mapping = self.mapping()?;
        export::write_summary(&mapping, writer, numbered)?;
        Ok(())
    }

    /// Write the extension buckets as text
    pub fn export_extensions<W: Write>(&self, writer: W, numbered: bool) -> Result<()> {
        let mapping = self.mapping()?;
        export::write_extensions(&mapping, writer, numbered)?;
        Ok(())
    }

    /// Persist the mapping to a database
    pub fn save_to(&self, db: &mut MapDatabase) -> Result<()> {
        let mapping = self.mapping()?;
        db.save(&mapping)?;
        info!("Saved mapping of {:?} to database", mapping.root);
        Ok(())
    }

    /// Install the mapping stored in a database
    pub fn load_from(&self, db: &MapDatabase) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != MapState::Unmapped {
            return Err(MappingError::AlreadyMapped);
        }
        let mapping = db.load()?.ok_or(MappingError::NotMapped)?;
        snapshot::validate(&mapping).map_err(MappingError::CorruptSnapshot)?;
        info!("Loaded mapping of {:?} from database", mapping.root);
        self.install(&mut inner, mapping);
        Ok(())
    }

    fn install(&self, inner: &mut Inner, mapping: Mapping) {
        *self.skipped.lock() = mapping.skipped.clone();
        inner.state = MapState::Mapped;
        inner.mapping = Some(Arc::new(mapping));
    }

    fn resolve_root(&self, root: &Path) -> Result<PathBuf> {
        let resolved = self
            .fs
            .canonicalize(root)
            .map_err(|source| MappingError::InvalidRoot {
                path: root.to_path_buf(),
                source,
            })?;
        if !self.fs.is_dir(&resolved) {
            return Err(MappingError::InvalidRoot {
                path: root.to_path_buf(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
            });
        }
        if !self.fs.is_accessible(&resolved) {
            return Err(MappingError::InvalidRoot {
                path: root.to_path_buf(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "directory cannot be listed"),
            });
        }
        Ok(resolved)
    }

    /// Run both pools until the barriers drain or the run is cancelled
    fn run(
        &self,
        pipeline: &Pipeline,
        scan_threads: usize,
        classify_threads: usize,
        reporter: &ProgressReporter,
        started: Instant,
    ) -> io::Result<Option<CancelReason>> {
        thread::scope(|scope| {
            let scanners = scanner::spawn_workers(scope, scan_threads, &self.fs, pipeline)?;
            let classifiers = match classifier::spawn_workers(scope, classify_threads, pipeline) {
                Ok(handles) => handles,
                Err(err) => {
                    pipeline.cancel();
                    pipeline.dirs.stop(scanners.len());
                    return Err(err);
                }
            };

            let outcome = self.await_completion(pipeline, reporter, started);
            // From here on cancel() has no run to stop
            self.inner.lock().active = None;

            pipeline.dirs.stop(scanners.len());
            join_workers("scan", scanners);
            pipeline.files.stop(classifiers.len());
            join_workers("classify", classifiers);

            let discarded = pipeline.dirs.discard_pending() + pipeline.files.discard_pending();
            if discarded > 0 {
                debug!("Discarded {} queued items", discarded);
            }
            Ok(outcome)
        })
    }

    fn await_completion(
        &self,
        pipeline: &Pipeline,
        reporter: &ProgressReporter,
        started: Instant,
    ) -> Option<CancelReason> {
        let tick = self.config.progress_interval();
        let deadline = self.config.deadline.map(|limit| started + limit);

        for (phase, queue) in [(MapPhase::Scan, &pipeline.dirs), (MapPhase::Classify, &pipeline.files)] {
            loop {
                let timeout = match deadline {
                    Some(at) => {
                        let left = at.saturating_duration_since(Instant::now());
                        if left.is_zero() {
                            warn!("Deadline expired during the {} phase", phase.as_str());
                            pipeline.cancel();
                            return Some(CancelReason::Deadline);
                        }
                        tick.min(left)
                    }
                    None => tick,
                };
                match queue.barrier().wait_for(timeout) {
                    BarrierWait::Drained => break,
                    BarrierWait::Interrupted => return Some(CancelReason::Requested),
                    BarrierWait::Pending => {
                        reporter.report_progress(phase, &pipeline.progress(started));
                    }
                }
            }
            debug!("{} phase drained", phase.as_str());
        }

        reporter.report_progress(MapPhase::Done, &pipeline.progress(started));
        None
    }
}

fn join_workers(pool: &str, handles: Vec<ScopedJoinHandle<'_, ()>>) {
    for handle in handles {
        if handle.join().is_err() {
            error!("A {} worker panicked", pool);
        }
    }
}

fn matching_buckets<'m, S: AsRef<str>>(
    mapping: &'m Mapping,
    exts: &[S],
    case_sensitive: bool,
) -> Vec<&'m [FileEntry]> {
    let mut seen = HashSet::new();
    let mut buckets = Vec::new();
    for ext in exts {
        for key in lookup_keys(ext.as_ref(), case_sensitive) {
            if seen.contains(&key) {
                continue;
            }
            let bucket = mapping.bucket(&key);
            if !bucket.is_empty() {
                buckets.push(bucket);
            }
            seen.insert(key);
        }
    }
    buckets
}
