//! Pathmap CLI
//!
//! Maps a directory tree, then answers extension and size queries from a
//! saved snapshot or database.

use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use pathmap::{
    IndexManager, ListSink, MapConfig, MapDatabase, MapState, Mapping, SkipKind, TextListWriter,
};

const ABOUT: &str = r#"
Pathmap - concurrent directory tree mapper

Examples:
  pathmap map -r /data                          map a tree and print totals
  pathmap map -r /data -s 2 -c 8 --progress     choose worker counts, show progress
  pathmap map -r /data -o data.map -d data.db   save a snapshot and a database
  pathmap map -r /data --timeout 30             give up after 30 seconds
  pathmap query --snapshot data.map -e jpg png  list files by extension
  pathmap size --db data.db                     total size of mapped files
"#;

/// Concurrent directory tree mapper
#[derive(Parser)]
#[command(name = "pathmap")]
#[command(author, version, about = ABOUT, long_about = None)]
#[command(help_template = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Map a directory tree
    Map {
        /// Root directory to map
        #[arg(short = 'r', long)]
        root: PathBuf,

        /// Scan worker count, 0 = auto
        #[arg(short = 's', long, default_value = "0")]
        scan_threads: usize,

        /// Classify worker count, 0 = auto
        #[arg(short = 'c', long, default_value = "0")]
        classify_threads: usize,

        /// Write a snapshot of the mapping to this file
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Save the mapping to this SQLite database
        #[arg(short = 'd', long)]
        db: Option<PathBuf>,

        /// Stop the run after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Emit JSON progress lines on stderr
        #[arg(long)]
        progress: bool,

        /// Progress interval in milliseconds
        #[arg(long, default_value = "500")]
        progress_interval: u64,

        /// Print the folder, file and extension lists
        #[arg(long)]
        summary: bool,

        /// Number the lines of printed lists
        #[arg(short = 'n', long)]
        numbered: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List mapped files by extension
    Query {
        #[command(flatten)]
        source: Source,

        /// Extensions to look up; an empty string selects files without one
        #[arg(short = 'e', long = "ext", num_args = 1.., required = true)]
        extensions: Vec<String>,

        /// Match the extension case exactly
        #[arg(long)]
        case_sensitive: bool,

        /// Number the printed lines
        #[arg(short = 'n', long)]
        numbered: bool,

        /// Only print how many files match
        #[arg(long)]
        count: bool,
    },

    /// Print the extension buckets of a saved mapping
    Extensions {
        #[command(flatten)]
        source: Source,

        /// Number the printed lines
        #[arg(short = 'n', long)]
        numbered: bool,
    },

    /// Sum the current sizes of mapped files
    Size {
        #[command(flatten)]
        source: Source,
    },
}

/// Where a saved mapping is read from
#[derive(Args)]
#[group(required = true, multiple = false)]
struct Source {
    /// Snapshot file written by `map -o`
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Database written by `map -d`
    #[arg(long)]
    db: Option<PathBuf>,
}

/// Result printed by `map --json`
#[derive(Serialize)]
struct MapReport {
    root: String,
    state: MapState,
    folders: usize,
    files: usize,
    extensions: Vec<(String, usize)>,
    skipped: usize,
    duration_ms: u64,
}

impl MapReport {
    fn new(mapping: &Mapping, duration_ms: u64) -> Self {
        Self {
            root: mapping.root.to_string_lossy().into_owned(),
            state: MapState::Mapped,
            folders: mapping.folder_count(),
            files: mapping.file_count(),
            extensions: mapping
                .extensions
                .iter()
                .map(|(key, entries)| (key.to_string(), entries.len()))
                .collect(),
            skipped: mapping.skipped.len(),
            duration_ms,
        }
    }
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Map {
            root,
            scan_threads,
            classify_threads,
            output,
            db,
            timeout,
            progress,
            progress_interval,
            summary,
            numbered,
            json,
        }) => {
            let mut config = MapConfig::builder()
                .scan_threads(scan_threads)
                .classify_threads(classify_threads)
                .show_progress(progress)
                .progress_interval_ms(progress_interval);
            if let Some(secs) = timeout {
                config = config.deadline(Duration::from_secs(secs));
            }
            let options = MapOptions {
                output,
                db,
                summary,
                numbered,
                json,
            };
            run_map(&root, config.build(), &options)
        }
        Some(Commands::Query {
            source,
            extensions,
            case_sensitive,
            numbered,
            count,
        }) => run_query(&source, &extensions, case_sensitive, numbered, count),
        Some(Commands::Extensions { source, numbered }) => load(&source)
            .and_then(|manager| manager.export_extensions(io::stdout().lock(), numbered)),
        Some(Commands::Size { source }) => run_size(&source),
        None => {
            println!("{}", ABOUT);
            println!("Use 'pathmap --help' for the full option list");
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("{}", err);
        std::process::exit(1);
    }
}

struct MapOptions {
    output: Option<PathBuf>,
    db: Option<PathBuf>,
    summary: bool,
    numbered: bool,
    json: bool,
}

fn run_map(root: &Path, config: MapConfig, options: &MapOptions) -> pathmap::Result<()> {
    info!("Root: {:?}", root);
    info!(
        "Threads: scan {}, classify {}",
        config.effective_scan_threads(),
        config.effective_classify_threads()
    );

    let manager = IndexManager::with_config(config);
    let started = Instant::now();
    let mapping = manager.createmap(root, 0, 0)?;
    let duration_ms = started.elapsed().as_millis() as u64;

    if let Some(path) = &options.output {
        fs::write(path, manager.export_map()?)?;
        info!("Snapshot written to {:?}", path);
    }
    if let Some(path) = &options.db {
        let mut db = MapDatabase::open(path)?;
        manager.save_to(&mut db)?;
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&MapReport::new(&mapping, duration_ms))?);
    } else if options.summary {
        manager.export_summary(io::stdout().lock(), options.numbered)?;
    } else {
        println!("Mapping completed:");
        println!("  Folders: {}", mapping.folder_count());
        println!("  Files: {}", mapping.file_count());
        println!("  Extensions: {}", mapping.extension_count());
        println!("  Skipped: {}", mapping.skipped.len());
        println!("  Duration: {}ms", duration_ms);
    }
    Ok(())
}

fn run_query(
    source: &Source,
    extensions: &[String],
    case_sensitive: bool,
    numbered: bool,
    count: bool,
) -> pathmap::Result<()> {
    let manager = load(source)?;
    if count {
        println!("{}", manager.count_by_extension(extensions, case_sensitive)?);
        return Ok(());
    }

    let entries = manager.query_by_extension(extensions, case_sensitive)?;
    let paths: Vec<&Path> = entries.iter().map(|entry| entry.path()).collect();
    let mut writer = TextListWriter::new(io::stdout().lock(), numbered);
    writer.write_list(&paths)?;
    Ok(())
}

fn run_size(source: &Source) -> pathmap::Result<()> {
    let manager = load(source)?;
    let total = manager.total_size()?;
    println!("{}", total);

    let mut stderr = io::stderr().lock();
    for record in manager.skipped() {
        if record.kind == SkipKind::InaccessibleFile {
            writeln!(stderr, "not counted {:?}: {}", record.path, record.message)?;
        }
    }
    Ok(())
}

fn load(source: &Source) -> pathmap::Result<IndexManager> {
    let manager = IndexManager::new();
    if let Some(path) = &source.snapshot {
        manager.import_map(&fs::read(path)?)?;
    } else if let Some(path) = &source.db {
        manager.load_from(&MapDatabase::open(path)?)?;
    }
    Ok(manager)
}
