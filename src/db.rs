//! Database module for persisting a mapping in SQLite

use chrono::Utc;
use indexmap::IndexMap;
use log::warn;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::error::{SkipKind, SkipRecord};
use crate::models::{ExtensionKey, FileEntry, Mapping};
use crate::os_text;

/// Database holding at most one saved mapping
pub struct MapDatabase {
    conn: Connection,
}

impl MapDatabase {
    /// Open or create database
    pub fn open(path: &Path) -> SqliteResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> SqliteResult<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS map_info (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                root BLOB NOT NULL,
                saved_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS folders (
                seq INTEGER PRIMARY KEY,
                path BLOB NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS files (
                seq INTEGER PRIMARY KEY,
                path BLOB NOT NULL UNIQUE
            );

            -- Paths and extensions are raw OS bytes; extension NULL is the UNKNOWN bucket
            CREATE TABLE IF NOT EXISTS buckets (
                seq INTEGER PRIMARY KEY,
                extension BLOB UNIQUE
            );

            CREATE TABLE IF NOT EXISTS bucket_files (
                bucket INTEGER NOT NULL REFERENCES buckets(seq),
                seq INTEGER NOT NULL,
                path BLOB NOT NULL,
                PRIMARY KEY (bucket, seq)
            );

            CREATE TABLE IF NOT EXISTS skipped (
                seq INTEGER PRIMARY KEY,
                kind TEXT NOT NULL,
                path BLOB NOT NULL,
                message TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Whether a mapping is stored
    pub fn has_mapping(&self) -> SqliteResult<bool> {
        self.conn
            .query_row("SELECT COUNT(*) > 0 FROM map_info", [], |row| row.get(0))
    }

    /// Remove the stored mapping
    pub fn clear(&mut self) -> SqliteResult<()> {
        let tx = self.conn.transaction()?;
        clear_tables(&tx)?;
        tx.commit()
    }

    /// Replace the stored mapping with `mapping`
    pub fn save(&mut self, mapping: &Mapping) -> SqliteResult<()> {
        let tx = self.conn.transaction()?;
        clear_tables(&tx)?;

        tx.execute(
            "INSERT INTO map_info (id, root, saved_at) VALUES (1, ?1, ?2)",
            params![os_blob(mapping.root.as_os_str()), Utc::now().to_rfc3339()],
        )?;

        {
            let mut stmt = tx.prepare("INSERT INTO folders (seq, path) VALUES (?1, ?2)")?;
            for (seq, folder) in mapping.folders.iter().enumerate() {
                stmt.execute(params![seq as i64, os_blob(folder.as_os_str())])?;
            }
        }

        {
            let mut stmt = tx.prepare("INSERT INTO files (seq, path) VALUES (?1, ?2)")?;
            for (seq, entry) in mapping.files.iter().enumerate() {
                stmt.execute(params![seq as i64, os_blob(entry.path.as_os_str())])?;
            }
        }

        {
            let mut bucket_stmt = tx.prepare("INSERT INTO buckets (seq, extension) VALUES (?1, ?2)")?;
            let mut entry_stmt =
                tx.prepare("INSERT INTO bucket_files (bucket, seq, path) VALUES (?1, ?2, ?3)")?;

            for (bucket, (key, entries)) in mapping.extensions.iter().enumerate() {
                let extension = key.as_os_str().map(os_blob);
                bucket_stmt.execute(params![bucket as i64, extension])?;

                for (seq, entry) in entries.iter().enumerate() {
                    entry_stmt.execute(params![bucket as i64, seq as i64, os_blob(entry.path.as_os_str())])?;
                }
            }
        }

        {
            let mut stmt =
                tx.prepare("INSERT INTO skipped (seq, kind, path, message) VALUES (?1, ?2, ?3, ?4)")?;
            for (seq, record) in mapping.skipped.iter().enumerate() {
                stmt.execute(params![
                    seq as i64,
                    record.kind.as_str(),
                    os_blob(record.path.as_os_str()),
                    record.message
                ])?;
            }
        }

        tx.commit()
    }

    /// Load the stored mapping, if any
    pub fn load(&self) -> SqliteResult<Option<Mapping>> {
        let root: Option<OsString> = self
            .conn
            .query_row("SELECT root FROM map_info WHERE id = 1", [], |row| os_column(row, 0))
            .optional()?;
        let Some(root) = root else {
            return Ok(None);
        };

        let folders = self.load_paths("SELECT path FROM folders ORDER BY seq")?;
        let files = self
            .load_paths("SELECT path FROM files ORDER BY seq")?
            .into_iter()
            .map(FileEntry::new)
            .collect();

        let mut extensions: IndexMap<ExtensionKey, Vec<FileEntry>> = IndexMap::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT b.extension, f.path FROM buckets b
                 JOIN bucket_files f ON f.bucket = b.seq
                 ORDER BY b.seq, f.seq",
            )?;
            let rows = stmt.query_map([], |row| {
                let extension = match row.get::<_, Option<Vec<u8>>>(0)? {
                    Some(bytes) => Some(os_decode(0, bytes)?),
                    None => None,
                };
                Ok((extension, os_column(row, 1)?))
            })?;

            for row in rows {
                let (extension, path) = row?;
                let key = match extension {
                    Some(ext) => ExtensionKey::Known(ext),
                    None => ExtensionKey::Unknown,
                };
                // A row filed under the wrong key is left for validation to reject
                extensions
                    .entry(key)
                    .or_default()
                    .push(FileEntry::new(PathBuf::from(path)));
            }
        }

        let mut skipped = Vec::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT kind, path, message FROM skipped ORDER BY seq")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    os_column(row, 1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;

            for row in rows {
                let (kind, path, message) = row?;
                match SkipKind::parse(&kind) {
                    Some(kind) => skipped.push(SkipRecord::new(kind, PathBuf::from(path), message)),
                    None => warn!("Ignoring skip record of unknown kind {:?}", kind),
                }
            }
        }

        Ok(Some(Mapping {
            root: PathBuf::from(root),
            folders,
            files,
            extensions,
            skipped,
        }))
    }

    fn load_paths(&self, sql: &str) -> SqliteResult<Vec<PathBuf>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| os_column(row, 0))?;

        let mut paths = Vec::new();
        for row in rows {
            paths.push(PathBuf::from(row?));
        }
        Ok(paths)
    }
}

fn clear_tables(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "
        DELETE FROM bucket_files;
        DELETE FROM buckets;
        DELETE FROM files;
        DELETE FROM folders;
        DELETE FROM skipped;
        DELETE FROM map_info;
        ",
    )
}

fn os_blob(value: &OsStr) -> Vec<u8> {
    os_text::to_bytes(value).into_owned()
}

fn os_column(row: &Row<'_>, idx: usize) -> SqliteResult<OsString> {
    os_decode(idx, row.get(idx)?)
}

fn os_decode(idx: usize, bytes: Vec<u8>) -> SqliteResult<OsString> {
    os_text::from_bytes(bytes)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Blob, Box::new(err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Mapping {
        let mut mapping = Mapping {
            root: PathBuf::from("/m"),
            folders: vec![PathBuf::from("/m/b"), PathBuf::from("/m/a")],
            skipped: vec![SkipRecord::unsupported(PathBuf::from("/m/fifo"), "fifo")],
            ..Default::default()
        };
        for name in ["b/x.PNG", "Makefile", "a/y.png", "a/z.PNG"] {
            let entry = FileEntry::new(PathBuf::from("/m").join(name));
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
    fn test_empty_database_has_no_mapping() {
        let db = MapDatabase::open_memory().unwrap();
        assert!(!db.has_mapping().unwrap());
        assert!(db.load().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_keeps_order() {
        let mut db = MapDatabase::open_memory().unwrap();
        let mapping = sample();
        db.save(&mapping).unwrap();

        assert!(db.has_mapping().unwrap());
        let loaded = db.load().unwrap().unwrap();
        assert_eq!(loaded, mapping);
        let keys: Vec<_> = loaded.extensions.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec![".PNG", "UNKNOWN", ".png"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_names_round_trip() {
        use std::os::unix::ffi::OsStrExt;

        let mut db = MapDatabase::open_memory().unwrap();
        let mut mapping = sample();
        mapping.folders.push(PathBuf::from(OsStr::from_bytes(b"/m/d\xff")));
        for name in [&b"/m/a.\xff"[..], b"/m/b.\xfe", b"/m/c\xff.png"] {
            let entry = FileEntry::new(PathBuf::from(OsStr::from_bytes(name)));
            mapping.files.push(entry.clone());
            mapping
                .extensions
                .entry(entry.extension.clone())
                .or_default()
                .push(entry);
        }
        mapping.skipped.push(SkipRecord::unsupported(
            PathBuf::from(OsStr::from_bytes(b"/m/sock\xff")),
            "socket",
        ));

        db.save(&mapping).unwrap();
        let loaded = db.load().unwrap().unwrap();
        assert_eq!(loaded, mapping);
        assert_eq!(loaded.extension_count(), 5);
    }

    #[test]
    fn test_save_replaces_previous_mapping() {
        let mut db = MapDatabase::open_memory().unwrap();
        db.save(&sample()).unwrap();

        let smaller = Mapping {
            root: PathBuf::from("/other"),
            ..Default::default()
        };
        db.save(&smaller).unwrap();
        assert_eq!(db.load().unwrap().unwrap(), smaller);

        db.clear().unwrap();
        assert!(!db.has_mapping().unwrap());
    }

    #[test]
    fn test_file_database_persists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("map.db");
        {
            let mut db = MapDatabase::open(&path).unwrap();
            db.save(&sample()).unwrap();
        }
        let db = MapDatabase::open(&path).unwrap();
        assert_eq!(db.load().unwrap().unwrap().file_count(), 4);
    }
}
