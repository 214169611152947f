//! Plain-text exports of a mapping

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::models::Mapping;

/// Destination for exported path lists
pub trait ListSink {
    /// Write `paths` in order
    fn write_list(&mut self, paths: &[&Path]) -> io::Result<()>;
}

/// Collects exported paths in memory
impl ListSink for Vec<PathBuf> {
    fn write_list(&mut self, paths: &[&Path]) -> io::Result<()> {
        self.extend(paths.iter().map(|p| p.to_path_buf()));
        Ok(())
    }
}

/// Writes one path per line, optionally numbered from 1
#[derive(Debug)]
pub struct TextListWriter<W: Write> {
    writer: W,
    numbered: bool,
}

impl<W: Write> TextListWriter<W> {
    /// Create a writer
    pub fn new(writer: W, numbered: bool) -> Self {
        Self { writer, numbered }
    }

    /// Recover the inner writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ListSink for TextListWriter<W> {
    fn write_list(&mut self, paths: &[&Path]) -> io::Result<()> {
        for (i, path) in paths.iter().enumerate() {
            if self.numbered {
                writeln!(self.writer, "{}: {}", i + 1, path.display())?;
            } else {
                writeln!(self.writer, "{}", path.display())?;
            }
        }
        self.writer.flush()
    }
}

fn write_item<W: Write>(writer: &mut W, indent: &str, index: usize, numbered: bool, path: &Path) -> io::Result<()> {
    if numbered {
        writeln!(writer, "{}{}: {}", indent, index + 1, path.display())
    } else {
        writeln!(writer, "{}{}", indent, path.display())
    }
}

/// Write the folder list, the file list, and the extension buckets
pub fn write_summary<W: Write>(mapping: &Mapping, mut writer: W, numbered: bool) -> io::Result<()> {
    writeln!(writer, "Folders found: {}", mapping.folder_count())?;
    for (i, folder) in mapping.folders.iter().enumerate() {
        write_item(&mut writer, "", i, numbered, folder)?;
    }

    writeln!(writer)?;
    writeln!(writer, "Files found: {}", mapping.file_count())?;
    for (i, entry) in mapping.files.iter().enumerate() {
        write_item(&mut writer, "", i, numbered, &entry.path)?;
    }

    writeln!(writer)?;
    writeln!(writer, "Extensions found: {}", mapping.extension_count())?;
    write_buckets(mapping, &mut writer, numbered)?;
    writer.flush()
}

/// Write the extension buckets only, `UNKNOWN` last
pub fn write_extensions<W: Write>(mapping: &Mapping, mut writer: W, numbered: bool) -> io::Result<()> {
    write_buckets(mapping, &mut writer, numbered)?;
    writer.flush()
}

fn write_buckets<W: Write>(mapping: &Mapping, writer: &mut W, numbered: bool) -> io::Result<()> {
    let known = mapping.extensions.iter().filter(|(key, _)| !key.is_unknown());
    let unknown = mapping.extensions.iter().filter(|(key, _)| key.is_unknown());

    for (key, entries) in known.chain(unknown) {
        writeln!(writer, "{} - {} files", key, entries.len())?;
        for (i, entry) in entries.iter().enumerate() {
            write_item(writer, "\t", i, numbered, &entry.path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileEntry;

    fn sample() -> Mapping {
        let mut mapping = Mapping {
            root: PathBuf::from("/d"),
            folders: vec![PathBuf::from("/d/sub")],
            ..Default::default()
        };
        for name in ["LICENSE", "sub/a.txt", "b.txt"] {
            let entry = FileEntry::new(PathBuf::from("/d").join(name));
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
    fn test_text_list_writer_numbering() {
        let a = PathBuf::from("/d/a");
        let b = PathBuf::from("/d/b");

        let mut numbered = TextListWriter::new(Vec::new(), true);
        numbered.write_list(&[&a, &b]).unwrap();
        assert_eq!(
            String::from_utf8(numbered.into_inner()).unwrap(),
            "1: /d/a\n2: /d/b\n"
        );

        let mut plain = TextListWriter::new(Vec::new(), false);
        plain.write_list(&[&a]).unwrap();
        assert_eq!(String::from_utf8(plain.into_inner()).unwrap(), "/d/a\n");
    }

    #[test]
    fn test_vec_sink_collects() {
        let mut sink: Vec<PathBuf> = Vec::new();
        sink.write_list(&[Path::new("/x")]).unwrap();
        assert_eq!(sink, vec![PathBuf::from("/x")]);
    }

    #[test]
    fn test_extensions_put_unknown_last() {
        let mut out = Vec::new();
        write_extensions(&sample(), &mut out, false).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(
            text,
            ".txt - 2 files\n\t/d/sub/a.txt\n\t/d/b.txt\nUNKNOWN - 1 files\n\t/d/LICENSE\n"
        );
    }

    #[test]
    fn test_summary_sections() {
        let mut out = Vec::new();
        write_summary(&sample(), &mut out, true).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("Folders found: 1\n1: /d/sub\n\nFiles found: 3\n"));
        assert!(text.contains("Extensions found: 2\n"));
        assert!(text.contains("\t1: /d/sub/a.txt\n"));
    }
}
