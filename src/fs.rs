//! Filesystem access layer used by the workers
//!
//! Workers never touch `std::fs` directly; everything goes through a
//! [`FileSystem`] so runs can be driven against an in-memory tree in tests.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// What a directory entry turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file (or a symbolic link to one)
    File,
    /// Directory
    Directory,
    /// Anything else, with a human-readable reason
    Other(String),
}

/// One immediate child of a listed directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Full path of the child
    pub path: PathBuf,
    /// Type reported by the filesystem
    pub kind: EntryKind,
}

impl DirEntry {
    /// Create a new entry
    pub fn new(path: PathBuf, kind: EntryKind) -> Self {
        Self { path, kind }
    }
}

/// Filesystem operations the mapper depends on
pub trait FileSystem: Send + Sync {
    /// Resolve `path` to an absolute, canonical form
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;

    /// Whether `path` is an existing directory
    fn is_dir(&self, path: &Path) -> bool;

    /// List the immediate children of `dir`, in the order the filesystem reports them
    fn list_dir(&self, dir: &Path) -> io::Result<Vec<DirEntry>>;

    /// Current on-disk size of a file
    fn stat_size(&self, path: &Path) -> io::Result<u64>;

    /// Whether `path` can be opened for reading
    fn is_accessible(&self, path: &Path) -> bool;
}

/// The local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl FileSystem for LocalFs {
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        fs::canonicalize(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
    }

    fn list_dir(&self, dir: &Path) -> io::Result<Vec<DirEntry>> {
        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .into_iter();

        let mut entries = Vec::new();
        for result in walker {
            match result {
                Ok(entry) => {
                    let kind = entry_kind(&entry);
                    entries.push(DirEntry::new(entry.into_path(), kind));
                }
                // Depth 0 is the directory itself: the whole listing failed
                Err(err) if err.depth() == 0 => return Err(err.into()),
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| dir.to_path_buf());
                    entries.push(DirEntry::new(path, EntryKind::Other(err.to_string())));
                }
            }
        }
        Ok(entries)
    }

    fn stat_size(&self, path: &Path) -> io::Result<u64> {
        fs::metadata(path).map(|m| m.len())
    }

    fn is_accessible(&self, path: &Path) -> bool {
        match fs::metadata(path) {
            Ok(m) if m.is_dir() => fs::read_dir(path).is_ok(),
            Ok(_) => fs::File::open(path).is_ok(),
            Err(_) => false,
        }
    }
}

fn entry_kind(entry: &walkdir::DirEntry) -> EntryKind {
    let file_type = entry.file_type();
    if file_type.is_dir() {
        return EntryKind::Directory;
    }
    if file_type.is_file() {
        return EntryKind::File;
    }
    if file_type.is_symlink() {
        // Links to files are indexed; links to directories are not followed
        return match fs::metadata(entry.path()) {
            Ok(target) if target.is_file() => EntryKind::File,
            Ok(target) if target.is_dir() => {
                EntryKind::Other("symbolic link to a directory".to_string())
            }
            Ok(_) => EntryKind::Other("symbolic link to a special file".to_string()),
            Err(err) => EntryKind::Other(format!("broken symbolic link: {}", err)),
        };
    }
    EntryKind::Other(special_kind(&file_type).to_string())
}

#[cfg(unix)]
fn special_kind(file_type: &fs::FileType) -> &'static str {
    use std::os::unix::fs::FileTypeExt;

    if file_type.is_socket() {
        "socket"
    } else if file_type.is_fifo() {
        "named pipe"
    } else if file_type.is_block_device() {
        "block device"
    } else if file_type.is_char_device() {
        "character device"
    } else {
        "unsupported file type"
    }
}

#[cfg(not(unix))]
fn special_kind(_file_type: &fs::FileType) -> &'static str {
    "unsupported file type"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn test_list_dir_is_not_recursive() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        File::create(tmp.path().join("sub").join("deep.txt")).unwrap();
        File::create(tmp.path().join("top.txt")).unwrap();

        let mut entries = LocalFs.list_dir(tmp.path()).unwrap();
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EntryKind::Directory);
        assert_eq!(entries[0].path, tmp.path().join("sub"));
        assert_eq!(entries[1].kind, EntryKind::File);
    }

    #[test]
    fn test_directory_with_dot_in_name_is_a_directory() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("v1.2")).unwrap();
        File::create(tmp.path().join("Makefile")).unwrap();

        let mut entries = LocalFs.list_dir(tmp.path()).unwrap();
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[1].kind, EntryKind::Directory);
    }

    #[test]
    fn test_list_missing_dir_fails() {
        let tmp = TempDir::new().unwrap();
        let result = LocalFs.list_dir(&tmp.path().join("missing"));
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_classified() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("dir")).unwrap();
        File::create(tmp.path().join("file.txt")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("dir"), tmp.path().join("to_dir")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("file.txt"), tmp.path().join("to_file"))
            .unwrap();
        std::os::unix::fs::symlink(tmp.path().join("nowhere"), tmp.path().join("broken"))
            .unwrap();

        let entries = LocalFs.list_dir(tmp.path()).unwrap();
        let kind_of = |name: &str| {
            entries
                .iter()
                .find(|e| e.path.file_name().unwrap() == name)
                .map(|e| e.kind.clone())
                .unwrap()
        };

        assert_eq!(kind_of("to_file"), EntryKind::File);
        assert!(matches!(kind_of("to_dir"), EntryKind::Other(_)));
        assert!(matches!(kind_of("broken"), EntryKind::Other(_)));
    }

    #[test]
    fn test_stat_size_and_access() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data.bin");
        fs::write(&path, [0u8; 42]).unwrap();

        assert_eq!(LocalFs.stat_size(&path).unwrap(), 42);
        assert!(LocalFs.is_accessible(&path));
        assert!(LocalFs.is_accessible(tmp.path()));
        assert!(LocalFs.is_dir(tmp.path()));
        assert!(!LocalFs.is_dir(&path));
        assert!(!LocalFs.is_accessible(&tmp.path().join("missing")));
    }
}
