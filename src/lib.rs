//! Concurrent directory-tree mapper
//!
//! This library walks a directory tree with a pool of scan workers, buckets
//! every file by extension with a pool of classify workers, and keeps the
//! result as a queryable, exportable mapping.

pub mod barrier;
pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod fs;
pub mod manager;
pub mod models;
pub mod os_text;
pub mod progress;
pub mod queue;
pub mod scanner;
pub mod snapshot;
pub mod store;

pub use barrier::{BarrierWait, CompletionBarrier};
pub use config::MapConfig;
pub use db::MapDatabase;
pub use error::{CancelReason, MappingError, Result, SkipKind, SkipRecord};
pub use export::{ListSink, TextListWriter};
pub use fs::{DirEntry, EntryKind, FileSystem, LocalFs};
pub use manager::IndexManager;
pub use models::{ExtensionKey, FileEntry, FolderContents, MapState, Mapping, UNKNOWN_BUCKET};
pub use progress::{DoneMessage, MapPhase, MapProgress, ProgressMessage, ProgressReporter, SkipMessage, StartMessage};
pub use queue::{Claimed, WorkQueue};
pub use snapshot::Snapshot;
