//! Configuration for mapping runs

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of scan workers
pub const DEFAULT_SCAN_THREADS: usize = 4;

/// Default number of classify workers
pub const DEFAULT_CLASSIFY_THREADS: usize = 4;

/// Upper bound for auto-detected worker counts
pub const MAX_AUTO_THREADS: usize = 8;

/// Default interval between progress messages
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 500;

/// Configuration for a mapping run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    /// Number of scan workers
    /// 0 means auto-detect
    pub scan_threads: usize,

    /// Number of classify workers
    /// 0 means auto-detect
    pub classify_threads: usize,

    /// Cancel the run once this much time has elapsed
    pub deadline: Option<Duration>,

    /// Whether to emit JSON progress lines on stderr
    pub show_progress: bool,

    /// Minimum interval between progress lines
    pub progress_interval_ms: u64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            scan_threads: DEFAULT_SCAN_THREADS,
            classify_threads: DEFAULT_CLASSIFY_THREADS,
            deadline: None,
            show_progress: false,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
        }
    }
}

impl MapConfig {
    /// Create a config builder
    pub fn builder() -> MapConfigBuilder {
        MapConfigBuilder::new()
    }

    /// Get the effective number of scan workers
    pub fn effective_scan_threads(&self) -> usize {
        resolve_threads(self.scan_threads)
    }

    /// Get the effective number of classify workers
    pub fn effective_classify_threads(&self) -> usize {
        resolve_threads(self.classify_threads)
    }

    /// Interval the orchestrator waits on the barrier between progress checks
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }
}

fn resolve_threads(requested: usize) -> usize {
    if requested == 0 {
        std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(DEFAULT_SCAN_THREADS)
            .clamp(1, MAX_AUTO_THREADS)
    } else {
        requested
    }
}

/// Builder for MapConfig
#[derive(Debug, Default)]
pub struct MapConfigBuilder {
    config: MapConfig,
}

impl MapConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of scan workers
    pub fn scan_threads(mut self, threads: usize) -> Self {
        self.config.scan_threads = threads;
        self
    }

    /// Set the number of classify workers
    pub fn classify_threads(mut self, threads: usize) -> Self {
        self.config.classify_threads = threads;
        self
    }

    /// Cancel runs that take longer than `deadline`
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.config.deadline = Some(deadline);
        self
    }

    /// Enable or disable progress output
    pub fn show_progress(mut self, enabled: bool) -> Self {
        self.config.show_progress = enabled;
        self
    }

    /// Set the progress interval
    pub fn progress_interval_ms(mut self, interval: u64) -> Self {
        self.config.progress_interval_ms = interval;
        self
    }

    /// Build the config
    pub fn build(self) -> MapConfig {
        self.config
    }
}
