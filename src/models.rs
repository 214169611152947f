//! Core data models for the path mapper

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::classifier::extension_key;
use crate::error::SkipRecord;

/// Label used when printing the bucket of files without an extension
pub const UNKNOWN_BUCKET: &str = "UNKNOWN";

/// Bucket key of the extension index
///
/// `Known` keeps the extension exactly as it appeared in the file name,
/// bytes included, so `JPG` and `jpg` are different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionKey {
    /// Extension after the final `.` of the file name, without the dot
    Known(#[serde(with = "crate::os_text")] OsString),
    /// No extension (`README`, `.gitignore`, `file.`)
    Unknown,
}

impl ExtensionKey {
    /// Build a key from a user-supplied extension
    ///
    /// A leading `.` is ignored; an empty request addresses the `UNKNOWN` bucket.
    pub fn from_query(ext: &str) -> Self {
        let ext = ext.strip_prefix('.').unwrap_or(ext);
        if ext.is_empty() {
            ExtensionKey::Unknown
        } else {
            ExtensionKey::Known(ext.into())
        }
    }

    /// The extension without its dot, `None` for the `UNKNOWN` bucket
    pub fn as_os_str(&self) -> Option<&OsStr> {
        match self {
            ExtensionKey::Known(ext) => Some(ext.as_os_str()),
            ExtensionKey::Unknown => None,
        }
    }

    /// Whether this is the `UNKNOWN` bucket
    pub fn is_unknown(&self) -> bool {
        matches!(self, ExtensionKey::Unknown)
    }
}

impl std::fmt::Display for ExtensionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtensionKey::Known(ext) => write!(f, ".{}", ext.to_string_lossy()),
            ExtensionKey::Unknown => f.write_str(UNKNOWN_BUCKET),
        }
    }
}

/// An indexed file with its bucket key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileEntry {
    /// Full path to the file
    #[serde(with = "crate::os_text")]
    pub path: PathBuf,
    /// Extension bucket the file belongs to
    pub extension: ExtensionKey,
}

impl FileEntry {
    /// Create an entry, deriving the extension from the path
    pub fn new(path: PathBuf) -> Self {
        let extension = extension_key(&path);
        Self { path, extension }
    }

    /// File name without the directory part
    pub fn name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Borrow the path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Lifecycle of the manager's mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MapState {
    /// No mapping
    #[default]
    Unmapped,
    /// A run is populating the collections
    Mapping,
    /// A complete, immutable mapping is available
    Mapped,
    /// A run was stopped early; results are incomplete
    Partial,
}

impl MapState {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MapState::Unmapped => "unmapped",
            MapState::Mapping => "mapping",
            MapState::Mapped => "mapped",
            MapState::Partial => "partial",
        }
    }
}

impl std::fmt::Display for MapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate result of a mapping run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    /// Canonical root the run started from
    #[serde(with = "crate::os_text")]
    pub root: PathBuf,
    /// Directories beneath the root, in discovery order
    #[serde(with = "crate::os_text::list")]
    pub folders: Vec<PathBuf>,
    /// Files beneath the root, in discovery order
    pub files: Vec<FileEntry>,
    /// Files grouped by extension, buckets in creation order
    #[serde(with = "bucket_list")]
    pub extensions: IndexMap<ExtensionKey, Vec<FileEntry>>,
    /// Paths that were not indexed during the run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkipRecord>,
}

impl Mapping {
    /// Number of folders found
    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    /// Number of files found
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Number of distinct extension buckets
    pub fn extension_count(&self) -> usize {
        self.extensions.len()
    }

    /// Sum of all bucket lengths
    pub fn bucket_total(&self) -> usize {
        self.extensions.values().map(Vec::len).sum()
    }

    /// Files in one bucket
    pub fn bucket(&self, key: &ExtensionKey) -> &[FileEntry] {
        self.extensions.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the bucket totals agree with the file sequence
    pub fn is_consistent(&self) -> bool {
        self.bucket_total() == self.files.len()
    }
}

/// Immediate children of one mapped folder
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FolderContents {
    /// Subfolders, in discovery order
    pub folders: Vec<PathBuf>,
    /// Files, in discovery order
    pub files: Vec<FileEntry>,
}

/// Buckets are stored as an ordered list of `[key, entries]` pairs so the
/// non-string keys survive JSON and bucket order is preserved.
mod bucket_list {
    use super::{ExtensionKey, FileEntry};
    use indexmap::IndexMap;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(
        buckets: &IndexMap<ExtensionKey, Vec<FileEntry>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(buckets.iter())
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<IndexMap<ExtensionKey, Vec<FileEntry>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pairs: Vec<(ExtensionKey, Vec<FileEntry>)> = Vec::deserialize(deserializer)?;
        let mut buckets = IndexMap::with_capacity(pairs.len());
        for (key, entries) in pairs {
            if buckets.contains_key(&key) {
                return Err(D::Error::custom(format!("duplicate bucket {}", key)));
            }
            buckets.insert(key, entries);
        }
        Ok(buckets)
    }
}
