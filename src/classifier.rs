//! Classify workers: bucket files by extension

use log::{debug, trace, warn};
use std::io;
use std::path::Path;
use std::thread::{self, Scope, ScopedJoinHandle};

use crate::manager::Pipeline;
use crate::models::{ExtensionKey, FileEntry};

/// Derive the bucket key of a file path
///
/// The key is whatever follows the final `.` of the file name, case kept as is.
/// Names without a dot, names whose only dot is the leading one, and names
/// ending in a dot go to the `UNKNOWN` bucket.
pub fn extension_key(path: &Path) -> ExtensionKey {
    match path.extension() {
        Some(ext) if !ext.is_empty() => ExtensionKey::Known(ext.to_os_string()),
        _ => ExtensionKey::Unknown,
    }
}

/// Keys a query for `ext` should look at
///
/// Case-insensitive lookups check the lower- and upper-case forms of the
/// requested extension; buckets with mixed case (`Jpg`) are only reached by
/// asking for them exactly.
pub fn lookup_keys(ext: &str, case_sensitive: bool) -> Vec<ExtensionKey> {
    let key = ExtensionKey::from_query(ext);
    if case_sensitive || key.is_unknown() {
        return vec![key];
    }

    let ext = ext.strip_prefix('.').unwrap_or(ext);
    let lower = ext.to_lowercase();
    let upper = ext.to_uppercase();
    if lower == upper {
        vec![ExtensionKey::Known(lower.into())]
    } else {
        vec![ExtensionKey::Known(lower.into()), ExtensionKey::Known(upper.into())]
    }
}

/// Start `count` classify workers inside `scope`
///
/// On a spawn failure the workers already started are told to stop.
pub(crate) fn spawn_workers<'scope>(
    scope: &'scope Scope<'scope, '_>,
    count: usize,
    pipeline: &'scope Pipeline,
) -> io::Result<Vec<ScopedJoinHandle<'scope, ()>>> {
    let mut handles = Vec::with_capacity(count);
    for id in 0..count {
        let spawned = thread::Builder::new()
            .name(format!("classify-{}", id))
            .spawn_scoped(scope, move || classify_worker(id, pipeline));
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                warn!("Failed to spawn classify worker {}: {}", id, err);
                pipeline.files.stop(handles.len());
                return Err(err);
            }
        }
    }
    Ok(handles)
}

fn classify_worker(id: usize, pipeline: &Pipeline) {
    debug!("classify worker {} started", id);
    let mut classified = 0u64;

    while let Some(file) = pipeline.files.pop() {
        if pipeline.is_cancelled() {
            continue;
        }
        let entry = FileEntry::new(file.item().clone());
        trace!("{:?} -> {}", entry.path, entry.extension);
        pipeline.store.insert_classified(entry);
        classified += 1;
    }

    debug!("classify worker {} exiting after {} files", id, classified);
}
