use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{PoolRuntimeSnapshot, WorkerRuntimeSnapshot};
use crate::format::{RecordFormat, SinkSummary};
use crate::io::{DEFAULT_PAGE_SIZE, SourceKind};
use crate::types::FileErrorPolicy;

/// Poll interval of the collector when no append wakes it.
pub const DEFAULT_COLLECTOR_POLL: Duration = Duration::from_millis(5);

/// Construction config for [`RlePipeline`](super::RlePipeline).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Bytes per page; the last page of a file may be shorter.
    pub page_size: usize,
    /// Number of compression workers.
    pub workers: usize,
    /// Maximum queued page tasks before the producer blocks. `None` is unbounded.
    pub queue_capacity: Option<usize>,
    /// How long the collector sleeps between checks when nothing is appended.
    pub collector_poll_interval: Duration,
    pub record_format: RecordFormat,
    pub file_error_policy: FileErrorPolicy,
    pub source_kind: SourceKind,
    /// Runs reserved up front in each pooled run buffer.
    pub run_buffer_capacity: usize,
    /// Idle run buffers kept for reuse.
    pub run_buffer_pool_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(available_workers())
    }
}

impl PipelineConfig {
    /// Creates a config with `workers` workers and default settings elsewhere.
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            workers,
            queue_capacity: None,
            collector_poll_interval: DEFAULT_COLLECTOR_POLL,
            record_format: RecordFormat::default(),
            file_error_policy: FileErrorPolicy::Abort,
            source_kind: SourceKind::Mmap,
            run_buffer_capacity: 256,
            run_buffer_pool_size: workers * 4,
        }
    }

    /// Clamps every count to at least one.
    pub fn normalized(mut self) -> Self {
        self.page_size = self.page_size.max(1);
        self.workers = self.workers.max(1);
        self.queue_capacity = self.queue_capacity.map(|limit| limit.max(1));
        self.run_buffer_pool_size = self.run_buffer_pool_size.max(1);
        if self.collector_poll_interval.is_zero() {
            self.collector_poll_interval = DEFAULT_COLLECTOR_POLL;
        }
        self
    }
}

/// Hardware parallelism, or one if it cannot be determined.
pub fn available_workers() -> usize {
    thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}

/// Which path produced a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncodeMode {
    Parallel,
    Sequential,
}

impl EncodeMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Parallel => "parallel",
            Self::Sequential => "sequential",
        }
    }
}

/// Progress emitted periodically while a parallel run is in flight.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub elapsed: Duration,
    pub files_total: usize,
    pub active_file: usize,
    pub pages_produced: u64,
    pub bytes_produced: u64,
    pub pages_merged: u64,
    pub bytes_merged: u64,
    pub runs_written: u64,
    pub queue_depth: usize,
    pub runtime: PoolRuntimeSnapshot,
}

/// Final statistics of a completed run.
#[derive(Debug, Clone)]
pub struct RunStats {
    pub mode: EncodeMode,
    pub elapsed: Duration,
    pub files_total: usize,
    /// Files with no bytes, contributing nothing to the output.
    pub files_empty: usize,
    /// Files that could not be opened and were skipped by policy.
    pub skipped_files: Vec<PathBuf>,
    pub pages_total: u64,
    pub input_bytes: u64,
    /// Runs after boundary merging, before wire splitting.
    pub runs_total: u64,
    pub boundary_merges: u64,
    pub output: SinkSummary,
    pub workers: Vec<WorkerRuntimeSnapshot>,
}

impl RunStats {
    pub(crate) fn new(mode: EncodeMode, files_total: usize) -> Self {
        Self {
            mode,
            elapsed: Duration::ZERO,
            files_total,
            files_empty: 0,
            skipped_files: Vec::new(),
            pages_total: 0,
            input_bytes: 0,
            runs_total: 0,
            boundary_merges: 0,
            output: SinkSummary::default(),
            workers: Vec::new(),
        }
    }
}
