//! Error types for the path mapper

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, MappingError>;

/// Why a mapping run stopped before completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelReason {
    /// `IndexManager::cancel` was called
    Requested,
    /// The configured deadline expired
    Deadline,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Requested => write!(f, "cancel requested"),
            CancelReason::Deadline => write!(f, "deadline expired"),
        }
    }
}

/// Errors surfaced synchronously by manager operations
#[derive(Debug, Error)]
pub enum MappingError {
    /// A mapping already exists (or is being built)
    #[error("a mapping already exists; call unmap() first")]
    AlreadyMapped,

    /// No complete mapping is available
    #[error("no complete mapping is available")]
    NotMapped,

    /// A mapping run is in progress
    #[error("a mapping run is in progress")]
    InProgress,

    /// The root cannot be used for mapping
    #[error("invalid root {path:?}: {source}")]
    InvalidRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The run stopped early and the mapping was left partial
    #[error("mapping stopped early ({reason}) after {folders} folders and {files} files")]
    Cancelled {
        reason: CancelReason,
        folders: usize,
        files: usize,
    },

    /// The path is not part of the mapping
    #[error("{0:?} is not in the mapping")]
    NotIndexed(PathBuf),

    /// An imported snapshot failed structural validation
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// Snapshot encoding failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error while writing exports
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Kinds of non-fatal skips recorded during a run or a size query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipKind {
    /// A directory could not be listed
    InaccessibleDirectory,
    /// A file could not be stat'ed
    InaccessibleFile,
    /// Neither a regular file nor a directory (socket, device, link...)
    UnsupportedEntry,
}

impl SkipKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipKind::InaccessibleDirectory => "inaccessible_directory",
            SkipKind::InaccessibleFile => "inaccessible_file",
            SkipKind::UnsupportedEntry => "unsupported_entry",
        }
    }

    /// Parse the string form produced by [`SkipKind::as_str`]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inaccessible_directory" => Some(SkipKind::InaccessibleDirectory),
            "inaccessible_file" => Some(SkipKind::InaccessibleFile),
            "unsupported_entry" => Some(SkipKind::UnsupportedEntry),
            _ => None,
        }
    }
}

/// A path that was not indexed, and why
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message} (path: {path:?})")]
pub struct SkipRecord {
    /// The kind of skip
    pub kind: SkipKind,
    /// The skipped path
    #[serde(with = "crate::os_text")]
    pub path: PathBuf,
    /// Human-readable reason
    pub message: String,
}

impl SkipRecord {
    /// Create a new skip record
    pub fn new(kind: SkipKind, path: PathBuf, message: impl Into<String>) -> Self {
        Self {
            kind,
            path,
            message: message.into(),
        }
    }

    /// A directory that could not be listed
    pub fn inaccessible_directory(path: PathBuf, err: &std::io::Error) -> Self {
        Self::new(SkipKind::InaccessibleDirectory, path, describe_io(err))
    }

    /// A file whose size could not be read
    pub fn inaccessible_file(path: PathBuf, err: &std::io::Error) -> Self {
        Self::new(SkipKind::InaccessibleFile, path, describe_io(err))
    }

    /// An entry that is neither a file nor a directory
    pub fn unsupported(path: PathBuf, reason: impl Into<String>) -> Self {
        Self::new(SkipKind::UnsupportedEntry, path, reason)
    }
}

fn describe_io(err: &std::io::Error) -> String {
    match err.kind() {
        std::io::ErrorKind::PermissionDenied => format!("Permission denied: {}", err),
        std::io::ErrorKind::NotFound => format!("Not found: {}", err),
        _ => err.to_string(),
    }
}
