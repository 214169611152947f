//! Snapshot encoding for `export_map` / `import_map`
//!
//! A snapshot is a JSON envelope around a [`Mapping`]. Decoding always runs
//! [`validate`], so a snapshot that parses but contradicts itself is
//! rejected as corrupt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::classifier::extension_key;
use crate::error::{MappingError, Result};
use crate::models::Mapping;

/// Format tag written into every snapshot
pub const SNAPSHOT_FORMAT: &str = "pathmap.snapshot";

/// Current snapshot version
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format: &'a str,
    version: u32,
    created_at: DateTime<Utc>,
    mapping: &'a Mapping,
}

#[derive(Deserialize)]
struct Envelope {
    format: String,
    version: u32,
    created_at: DateTime<Utc>,
    mapping: Mapping,
}

/// A decoded snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// When the snapshot was exported
    pub created_at: DateTime<Utc>,
    /// The exported mapping
    pub mapping: Mapping,
}

/// Serialize a mapping into snapshot bytes
pub fn encode(mapping: &Mapping) -> Result<Vec<u8>> {
    let envelope = EnvelopeRef {
        format: SNAPSHOT_FORMAT,
        version: SNAPSHOT_VERSION,
        created_at: Utc::now(),
        mapping,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Parse and validate snapshot bytes
pub fn decode(bytes: &[u8]) -> Result<Snapshot> {
    let envelope: Envelope = serde_json::from_slice(bytes)
        .map_err(|e| MappingError::CorruptSnapshot(format!("unreadable payload: {}", e)))?;

    if envelope.format != SNAPSHOT_FORMAT {
        return Err(MappingError::CorruptSnapshot(format!(
            "unexpected format {:?}",
            envelope.format
        )));
    }
    if envelope.version != SNAPSHOT_VERSION {
        return Err(MappingError::CorruptSnapshot(format!(
            "unsupported version {}",
            envelope.version
        )));
    }

    validate(&envelope.mapping).map_err(MappingError::CorruptSnapshot)?;

    Ok(Snapshot {
        created_at: envelope.created_at,
        mapping: envelope.mapping,
    })
}

/// Check the structural invariants of a mapping
///
/// Returns a description of the first violation found.
pub fn validate(mapping: &Mapping) -> std::result::Result<(), String> {
    if mapping.root.as_os_str().is_empty() {
        return Err("empty root".to_string());
    }

    let mut folders = HashSet::with_capacity(mapping.folders.len());
    for folder in &mapping.folders {
        if !folders.insert(folder.as_path()) {
            return Err(format!("folder {:?} listed twice", folder));
        }
    }

    let mut files: HashSet<&Path> = HashSet::with_capacity(mapping.files.len());
    for entry in &mapping.files {
        if !files.insert(entry.path.as_path()) {
            return Err(format!("file {:?} listed twice", entry.path));
        }
        if entry.extension != extension_key(&entry.path) {
            return Err(format!("file {:?} carries the wrong extension", entry.path));
        }
    }

    let mut bucketed: HashSet<&Path> = HashSet::with_capacity(mapping.files.len());
    for (key, entries) in &mapping.extensions {
        if entries.is_empty() {
            return Err(format!("bucket {} is empty", key));
        }
        for entry in entries {
            if &entry.extension != key {
                return Err(format!("{:?} is in bucket {}", entry.path, key));
            }
            if !files.contains(entry.path.as_path()) {
                return Err(format!("{:?} is bucketed but not in the file list", entry.path));
            }
            if !bucketed.insert(entry.path.as_path()) {
                return Err(format!("{:?} is bucketed twice", entry.path));
            }
        }
    }

    if bucketed.len() != files.len() {
        return Err(format!(
            "{} files but {} bucketed entries",
            files.len(),
            bucketed.len()
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtensionKey, FileEntry};
    use std::path::PathBuf;

    fn sample() -> Mapping {
        let mut mapping = Mapping {
            root: PathBuf::from("/data"),
            folders: vec![PathBuf::from("/data/src")],
            ..Default::default()
        };
        for name in ["src/main.rs", "README", "src/lib.rs"] {
            let entry = FileEntry::new(PathBuf::from("/data").join(name));
            mapping.files.push(entry.clone());
            mapping
                .extensions
                .entry(entry.extension.clone())
                .or_default()
                .push(entry);
        }
        mapping
    }

    #[test]
    fn test_encode_decode() {
        let mapping = sample();
        let bytes = encode(&mapping).unwrap();
        let snapshot = decode(&bytes).unwrap();

        assert_eq!(snapshot.mapping, mapping);
        assert!(snapshot.created_at <= Utc::now());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_names_round_trip() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let mut mapping = sample();
        for name in [&b"src/bad\xff.txt"[..], b"src/x.\xff", b"src/y.\xfe"] {
            let entry = FileEntry::new(PathBuf::from("/data").join(OsStr::from_bytes(name)));
            mapping.files.push(entry.clone());
            mapping
                .extensions
                .entry(entry.extension.clone())
                .or_default()
                .push(entry);
        }
        assert_eq!(mapping.extension_count(), 5);

        let snapshot = decode(&encode(&mapping).unwrap()).unwrap();
        assert_eq!(snapshot.mapping, mapping);
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let err = decode(b"not json").unwrap_err();
        assert!(matches!(err, MappingError::CorruptSnapshot(_)));
    }

    #[test]
    fn test_wrong_format_is_corrupt() {
        let mut value: serde_json::Value = serde_json::from_slice(&encode(&sample()).unwrap()).unwrap();
        value["format"] = serde_json::Value::from("something.else");
        let err = decode(&serde_json::to_vec(&value).unwrap()).unwrap_err();
        assert!(matches!(err, MappingError::CorruptSnapshot(_)));
    }

    #[test]
    fn test_validate_catches_missing_bucket_entry() {
        let mut mapping = sample();
        mapping
            .extensions
            .get_mut(&ExtensionKey::Known("rs".into()))
            .unwrap()
            .pop();
        assert!(validate(&mapping).unwrap_err().contains("bucketed entries"));
    }

    #[test]
    fn test_validate_catches_misfiled_entry() {
        let mut mapping = sample();
        let stray = FileEntry::new(PathBuf::from("/data/README"));
        mapping
            .extensions
            .get_mut(&ExtensionKey::Known("rs".into()))
            .unwrap()
            .push(stray);
        assert!(validate(&mapping).is_err());
    }

    #[test]
    fn test_validate_catches_duplicate_folder() {
        let mut mapping = sample();
        mapping.folders.push(PathBuf::from("/data/src"));
        assert!(validate(&mapping).unwrap_err().contains("twice"));
    }
}
