//! Progress reporting module for mapping runs
//!
//! This module provides data structures and utilities for reporting
//! mapping progress to external callers via stderr, one JSON object per line.

use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::error::SkipRecord;
use crate::models::{MapState, Mapping};

/// Mapping phase indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MapPhase {
    /// Listing directories
    #[default]
    Scan,
    /// Classifying the remaining files
    Classify,
    /// Run finished
    Done,
}

impl MapPhase {
    /// Get string representation of the phase
    pub fn as_str(&self) -> &'static str {
        match self {
            MapPhase::Scan => "scan",
            MapPhase::Classify => "classify",
            MapPhase::Done => "done",
        }
    }
}

/// Counters sampled from a running pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapProgress {
    /// Folders discovered so far
    pub folders: u64,
    /// Files discovered so far
    pub files: u64,
    /// Files classified so far
    pub classified: u64,
    /// Directories enqueued but not yet listed
    pub pending_dirs: u64,
    /// Files enqueued but not yet classified
    pub pending_files: u64,
    /// Elapsed time in milliseconds
    pub elapsed_ms: u64,
}

/// Start message sent when a run begins
#[derive(Debug, Clone, Serialize)]
pub struct StartMessage {
    /// Message type identifier
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Canonical root
    pub root: String,
    /// Number of scan workers
    pub scan_threads: usize,
    /// Number of classify workers
    pub classify_threads: usize,
}

impl StartMessage {
    /// Create a new start message
    pub fn new(seq: u64, ts: u64, root: String, scan_threads: usize, classify_threads: usize) -> Self {
        Self {
            msg_type: "start",
            seq,
            ts,
            root,
            scan_threads,
            classify_threads,
        }
    }
}

/// Progress message sent while a run is in flight
#[derive(Debug, Clone, Serialize)]
pub struct ProgressMessage {
    /// Message type identifier ("p" for progress)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Current phase
    pub phase: MapPhase,
    /// Folders discovered
    #[serde(rename = "d")]
    pub folders: u64,
    /// Files discovered
    #[serde(rename = "f")]
    pub files: u64,
    /// Files classified
    #[serde(rename = "c")]
    pub classified: u64,
    /// Directories still outstanding
    #[serde(rename = "pd")]
    pub pending_dirs: u64,
    /// Files still outstanding
    #[serde(rename = "pf")]
    pub pending_files: u64,
    /// Elapsed time in milliseconds
    pub ms: u64,
}

impl ProgressMessage {
    /// Create a progress message from sampled counters
    pub fn new(seq: u64, ts: u64, phase: MapPhase, progress: &MapProgress) -> Self {
        Self {
            msg_type: "p",
            seq,
            ts,
            phase,
            folders: progress.folders,
            files: progress.files,
            classified: progress.classified,
            pending_dirs: progress.pending_dirs,
            pending_files: progress.pending_files,
            ms: progress.elapsed_ms,
        }
    }
}

/// Message sent for each path that was not indexed
#[derive(Debug, Clone, Serialize)]
pub struct SkipMessage {
    /// Message type identifier ("skip")
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Skip kind
    pub kind: &'static str,
    /// Reason
    pub message: String,
    /// Skipped path
    pub path: String,
}

impl SkipMessage {
    /// Create a skip message from a record
    pub fn new(seq: u64, ts: u64, record: &SkipRecord) -> Self {
        Self {
            msg_type: "skip",
            seq,
            ts,
            kind: record.kind.as_str(),
            message: record.message.clone(),
            path: record.path.to_string_lossy().to_string(),
        }
    }
}

/// Done message sent when a run ends
#[derive(Debug, Clone, Serialize)]
pub struct DoneMessage {
    /// Message type identifier ("done" for completion)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Final state (mapped or partial)
    pub state: MapState,
    /// Total folders
    #[serde(rename = "td")]
    pub total_folders: usize,
    /// Total files
    #[serde(rename = "tf")]
    pub total_files: usize,
    /// Number of extension buckets
    #[serde(rename = "te")]
    pub total_extensions: usize,
    /// Number of skipped paths
    #[serde(rename = "sk")]
    pub skipped: usize,
    /// Run duration in milliseconds
    pub ms: u64,
}

impl DoneMessage {
    /// Create a done message for a finished run
    pub fn new(seq: u64, ts: u64, state: MapState, mapping: &Mapping, ms: u64) -> Self {
        Self {
            msg_type: "done",
            seq,
            ts,
            state,
            total_folders: mapping.folder_count(),
            total_files: mapping.file_count(),
            total_extensions: mapping.extension_count(),
            skipped: mapping.skipped.len(),
            ms,
        }
    }
}

/// Progress reporter for outputting run progress to stderr
///
/// Owned by the orchestrating thread of a single run.
pub struct ProgressReporter {
    /// Whether progress reporting is enabled
    enabled: bool,
    /// Reporting interval in milliseconds
    interval_ms: u64,
    /// Last report time
    last_report: std::cell::Cell<Instant>,
    /// Sequence number for messages
    seq: AtomicU64,
    /// Start time of the reporter
    start_time: Instant,
}

impl ProgressReporter {
    /// Create a new ProgressReporter
    ///
    /// # Arguments
    /// * `enabled` - Whether progress reporting is enabled
    /// * `interval_ms` - Minimum interval between progress messages in milliseconds
    pub fn new(enabled: bool, interval_ms: u64) -> Self {
        let now = Instant::now();
        Self {
            enabled,
            interval_ms,
            last_report: std::cell::Cell::new(now),
            seq: AtomicU64::new(0),
            start_time: now,
        }
    }

    /// Check if enough time has passed since the last report
    pub fn should_report(&self) -> bool {
        if !self.enabled {
            return false;
        }
        let elapsed = self.last_report.get().elapsed().as_millis() as u64;
        elapsed >= self.interval_ms
    }

    /// Get the next sequence number (monotonically increasing)
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Get the current timestamp in milliseconds since reporter creation
    pub fn current_timestamp(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Output a serializable message to stderr as JSON
    pub fn output_to_stderr<T: Serialize>(&self, msg: &T) {
        if let Ok(json) = serde_json::to_string(msg) {
            eprintln!("{}", json);
            std::io::stderr().flush().ok();
        }
    }

    /// Report the start of a run
    pub fn report_start(&self, root: &Path, scan_threads: usize, classify_threads: usize) {
        if !self.enabled {
            return;
        }

        let msg = StartMessage::new(
            self.next_seq(),
            self.current_timestamp(),
            root.to_string_lossy().to_string(),
            scan_threads,
            classify_threads,
        );
        self.output_to_stderr(&msg);
    }

    /// Report run progress
    ///
    /// Returns true if a message was actually sent (respects interval timing).
    pub fn report_progress(&self, phase: MapPhase, progress: &MapProgress) -> bool {
        if !self.should_report() {
            return false;
        }

        let msg = ProgressMessage::new(self.next_seq(), self.current_timestamp(), phase, progress);
        self.output_to_stderr(&msg);
        self.last_report.set(Instant::now());
        true
    }

    /// Report every skip record (ignores interval timing)
    pub fn report_skips(&self, records: &[SkipRecord]) {
        if !self.enabled {
            return;
        }
        for record in records {
            let msg = SkipMessage::new(self.next_seq(), self.current_timestamp(), record);
            self.output_to_stderr(&msg);
        }
    }

    /// Report the end of a run
    pub fn report_done(&self, state: MapState, mapping: &Mapping, duration_ms: u64) {
        if !self.enabled {
            return;
        }

        let msg = DoneMessage::new(
            self.next_seq(),
            self.current_timestamp(),
            state,
            mapping,
            duration_ms,
        );
        self.output_to_stderr(&msg);
    }

    /// Check if the reporter is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileEntry;
    use std::path::PathBuf;

    #[test]
    fn test_map_phase_serialization() {
        assert_eq!(serde_json::to_string(&MapPhase::Scan).unwrap(), "\"scan\"");
        assert_eq!(
            serde_json::to_string(&MapPhase::Classify).unwrap(),
            "\"classify\""
        );
        assert_eq!(MapPhase::Done.as_str(), "done");
    }

    #[test]
    fn test_start_message_serialization() {
        let msg = StartMessage::new(1, 100, "/data".to_string(), 2, 6);
        let parsed: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(parsed["_t"], "start");
        assert_eq!(parsed["seq"], 1);
        assert_eq!(parsed["root"], "/data");
        assert_eq!(parsed["scan_threads"], 2);
        assert_eq!(parsed["classify_threads"], 6);
    }

    #[test]
    fn test_progress_message_serialization() {
        let progress = MapProgress {
            folders: 10,
            files: 100,
            classified: 80,
            pending_dirs: 3,
            pending_files: 20,
            elapsed_ms: 1500,
        };
        let msg = ProgressMessage::new(2, 200, MapPhase::Classify, &progress);
        let parsed: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(parsed["_t"], "p");
        assert_eq!(parsed["phase"], "classify");
        assert_eq!(parsed["d"], 10);
        assert_eq!(parsed["f"], 100);
        assert_eq!(parsed["c"], 80);
        assert_eq!(parsed["pd"], 3);
        assert_eq!(parsed["pf"], 20);
        assert_eq!(parsed["ms"], 1500);
    }

    #[test]
    fn test_skip_message_serialization() {
        let record = SkipRecord::unsupported(PathBuf::from("/data/fifo"), "named pipe");
        let parsed: serde_json::Value =
            serde_json::to_value(SkipMessage::new(3, 300, &record)).unwrap();

        assert_eq!(parsed["_t"], "skip");
        assert_eq!(parsed["kind"], "unsupported_entry");
        assert_eq!(parsed["message"], "named pipe");
        assert_eq!(parsed["path"], "/data/fifo");
    }

    #[test]
    fn test_done_message_serialization() {
        let mut mapping = Mapping {
            root: PathBuf::from("/data"),
            folders: vec![PathBuf::from("/data/a")],
            ..Default::default()
        };
        let entry = FileEntry::new(PathBuf::from("/data/a/x.txt"));
        mapping.files.push(entry.clone());
        mapping.extensions.insert(entry.extension.clone(), vec![entry]);

        let msg = DoneMessage::new(10, 5000, MapState::Mapped, &mapping, 4500);
        let parsed: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(parsed["_t"], "done");
        assert_eq!(parsed["state"], "mapped");
        assert_eq!(parsed["td"], 1);
        assert_eq!(parsed["tf"], 1);
        assert_eq!(parsed["te"], 1);
        assert_eq!(parsed["sk"], 0);
        assert_eq!(parsed["ms"], 4500);
    }

    #[test]
    fn test_progress_reporter_sequence_numbers() {
        let reporter = ProgressReporter::new(true, 200);
        assert_eq!(reporter.next_seq(), 0);
        assert_eq!(reporter.next_seq(), 1);
        assert_eq!(reporter.next_seq(), 2);
    }

    #[test]
    fn test_progress_reporter_should_report_timing() {
        let reporter = ProgressReporter::new(true, 10);
        reporter.last_report.set(Instant::now());
        assert!(!reporter.should_report());

        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(reporter.should_report());
    }

    #[test]
    fn test_disabled_reporter_is_silent() {
        let reporter = ProgressReporter::new(false, 0);
        assert!(!reporter.is_enabled());
        assert!(!reporter.should_report());

        reporter.report_start(Path::new("/data"), 1, 1);
        assert!(!reporter.report_progress(MapPhase::Scan, &MapProgress::default()));
        reporter.report_skips(&[SkipRecord::unsupported(PathBuf::from("/x"), "socket")]);
        reporter.report_done(MapState::Mapped, &Mapping::default(), 0);

        // Nothing consumed a sequence number
        assert_eq!(reporter.next_seq(), 0);
    }
}
