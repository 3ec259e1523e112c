//! The parallel encoding pipeline.
//!
//! One producer thread opens the inputs and cuts them into pages, a fixed
//! set of workers compresses pages in any order and merges them strictly in
//! `(file, page)` order through the [`OrderingCoordinator`], and a collector
//! thread streams sealed runs to the sink while merging continues. All
//! threads live in one `std::thread::scope`, so sinks and inputs may be
//! borrowed.

use std::io::Write;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, bounded};

use crate::PzipError;
use crate::buffer::RunBufferPool;
use crate::codec::{self, SequentialEncoder};
use crate::core::{OrderingCoordinator, WorkQueue, WorkerPool, panic_message};
use crate::format::{RecordWriter, RunSink};
use crate::io::{FileHandle, FileSource, PageSplitter};
use crate::telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
use crate::types::{FileErrorPolicy, PageTask, Result};

mod collector;
mod result;
mod types;

pub use collector::{CollectorSignals, CollectorStats, run_collector};
pub use result::{AppendOutcome, ResultSequence};
pub use types::{
    DEFAULT_COLLECTOR_POLL, EncodeMode, PipelineConfig, ProgressSnapshot, RunStats,
    available_workers,
};

/// Input files of one run, in command-line order.
enum Inputs {
    Paths(Vec<PathBuf>),
    Handles(Vec<FileHandle>),
}

impl Inputs {
    fn len(&self) -> usize {
        match self {
            Self::Paths(paths) => paths.len(),
            Self::Handles(handles) => handles.len(),
        }
    }

    fn path(&self, index: usize) -> PathBuf {
        match self {
            Self::Paths(paths) => paths[index].clone(),
            Self::Handles(handles) => handles[index].path().to_path_buf(),
        }
    }

    fn open(&self, index: usize, source: &dyn FileSource) -> Result<FileHandle> {
        match self {
            Self::Paths(paths) => source.open(index, &paths[index]),
            Self::Handles(handles) => Ok(handles[index].clone()),
        }
    }
}

#[derive(Debug, Default)]
struct ProducerReport {
    files_empty: usize,
    skipped_files: Vec<PathBuf>,
}

#[derive(Debug, Default)]
struct RunCounters {
    pages_produced: AtomicU64,
    bytes_produced: AtomicU64,
    pages_merged: AtomicU64,
    bytes_merged: AtomicU64,
}

/// State shared by every thread of one parallel run.
struct SharedRun {
    queue: WorkQueue<PageTask>,
    coordinator: OrderingCoordinator,
    sequence: ResultSequence,
    workers: WorkerPool,
    signals: CollectorSignals,
    counters: RunCounters,
    first_error: Mutex<Option<PzipError>>,
}

impl SharedRun {
    /// Records `error` and tears the run down.
    ///
    /// The first real error wins; `Aborted` only fills an empty slot since
    /// it is normally a consequence of an earlier failure.
    fn fail(&self, error: PzipError) {
        {
            let mut slot = match self.first_error.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let replace = match slot.as_ref() {
                None => true,
                Some(PzipError::Aborted) => !matches!(error, PzipError::Aborted),
                Some(_) => false,
            };
            if replace {
                *slot = Some(error);
            }
        }

        self.queue.close();
        self.coordinator.abort();
        self.signals.abort();
        self.sequence.ring();
    }

    fn take_error(&self) -> Option<PzipError> {
        match self.first_error.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    fn progress(&self, started_at: Instant, files_total: usize) -> ProgressSnapshot {
        let pages_produced = self.counters.pages_produced.load(Ordering::Acquire);
        let pages_merged = self.counters.pages_merged.load(Ordering::Acquire);
        let pending = usize::try_from(pages_produced.saturating_sub(pages_merged)).unwrap_or(usize::MAX);

        ProgressSnapshot {
            elapsed: started_at.elapsed(),
            files_total,
            active_file: self.coordinator.active_file().min(files_total),
            pages_produced,
            bytes_produced: self.counters.bytes_produced.load(Ordering::Acquire),
            pages_merged,
            bytes_merged: self.counters.bytes_merged.load(Ordering::Acquire),
            runs_written: self.signals.runs_written(),
            queue_depth: self.queue.len(),
            runtime: self.workers.runtime_snapshot(pending),
        }
    }
}

type ProgressCallback<'a> = (Duration, &'a mut dyn FnMut(ProgressSnapshot));

/// Parallel run-length encoder over a list of files.
///
/// # Example
/// ```no_run
/// use pzip_core::{PipelineConfig, RlePipeline};
///
/// let pipeline = RlePipeline::new(PipelineConfig::new(4));
/// let writer = pipeline.record_writer(Vec::new());
/// let (writer, stats) = pipeline.encode_paths(&["a.bin", "b.bin"], writer)?;
/// assert_eq!(stats.output.bytes, writer.bytes_written());
/// # Ok::<(), pzip_core::PzipError>(())
/// ```
pub struct RlePipeline {
    config: PipelineConfig,
    splitter: PageSplitter,
    buffer_pool: Arc<RunBufferPool>,
    telemetry: Arc<dyn WorkerTelemetry>,
}

impl RlePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let config = config.normalized();
        let buffer_pool = Arc::new(RunBufferPool::new(
            config.run_buffer_capacity,
            config.run_buffer_pool_size,
        ));
        Self::with_buffer_pool(config, buffer_pool)
    }

    /// Creates a pipeline sharing an existing run buffer pool.
    pub fn with_buffer_pool(config: PipelineConfig, buffer_pool: Arc<RunBufferPool>) -> Self {
        let config = config.normalized();
        Self {
            splitter: PageSplitter::new(config.page_size),
            config,
            buffer_pool,
            telemetry: Arc::new(DefaultWorkerTelemetry),
        }
    }

    /// Replaces the worker telemetry backend.
    pub fn with_worker_telemetry(mut self, telemetry: Arc<dyn WorkerTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn buffer_pool(&self) -> &Arc<RunBufferPool> {
        &self.buffer_pool
    }

    /// Wraps `writer` in a record writer using the configured wire format.
    pub fn record_writer<W: Write>(&self, writer: W) -> RecordWriter<W> {
        RecordWriter::with_format(writer, self.config.record_format)
    }

    /// Encodes `paths` in order into `sink` using the parallel pipeline.
    pub fn encode_paths<P, S>(&self, paths: &[P], sink: S) -> Result<(S, RunStats)>
    where
        P: AsRef<Path>,
        S: RunSink + Send,
    {
        self.run_parallel(Self::path_inputs(paths), sink, None)
    }

    /// Like [`RlePipeline::encode_paths`], reporting progress every `interval`.
    ///
    /// A final snapshot is always emitted once every page has merged.
    pub fn encode_paths_with_progress<P, S, F>(
        &self,
        paths: &[P],
        sink: S,
        interval: Duration,
        mut on_progress: F,
    ) -> Result<(S, RunStats)>
    where
        P: AsRef<Path>,
        S: RunSink + Send,
        F: FnMut(ProgressSnapshot),
    {
        self.run_parallel(
            Self::path_inputs(paths),
            sink,
            Some((interval, &mut on_progress)),
        )
    }

    /// Encodes already opened inputs. `handles[i]` must have file index `i`.
    pub fn encode_handles<S>(&self, handles: Vec<FileHandle>, sink: S) -> Result<(S, RunStats)>
    where
        S: RunSink + Send,
    {
        Self::check_handle_indexes(&handles)?;
        self.run_parallel(Inputs::Handles(handles), sink, None)
    }

    /// Single-threaded fallback; produces exactly the same run stream.
    pub fn encode_sequential<P, S>(&self, paths: &[P], sink: S) -> Result<(S, RunStats)>
    where
        P: AsRef<Path>,
        S: RunSink,
    {
        self.run_sequential(Self::path_inputs(paths), sink)
    }

    /// Single-threaded encoding of already opened inputs.
    pub fn encode_handles_sequential<S>(
        &self,
        handles: Vec<FileHandle>,
        sink: S,
    ) -> Result<(S, RunStats)>
    where
        S: RunSink,
    {
        Self::check_handle_indexes(&handles)?;
        self.run_sequential(Inputs::Handles(handles), sink)
    }

    fn path_inputs<P: AsRef<Path>>(paths: &[P]) -> Inputs {
        Inputs::Paths(paths.iter().map(|path| path.as_ref().to_path_buf()).collect())
    }

    fn check_handle_indexes(handles: &[FileHandle]) -> Result<()> {
        if handles
            .iter()
            .enumerate()
            .any(|(index, handle)| handle.file_index() != index)
        {
            return Err(PzipError::InvalidFormat(
                "file handles must be indexed by their position",
            ));
        }
        Ok(())
    }

    /// Opens input `index`, applying the file error policy.
    ///
    /// Returns `None` when the file was skipped.
    fn open_input(
        &self,
        inputs: &Inputs,
        index: usize,
        skipped: &mut Vec<PathBuf>,
    ) -> Result<Option<FileHandle>> {
        match inputs.open(index, &self.config.source_kind) {
            Ok(handle) => Ok(Some(handle)),
            Err(error)
                if error.is_file_access() && self.config.file_error_policy == FileErrorPolicy::Skip =>
            {
                let path = inputs.path(index);
                tracing::warn!(path = %path.display(), file_index = index, %error, "skipping unreadable input");
                skipped.push(path);
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    fn produce(&self, inputs: &Inputs, shared: &SharedRun) -> Result<ProducerReport> {
        let mut report = ProducerReport::default();

        for index in 0..inputs.len() {
            let Some(handle) = self.open_input(inputs, index, &mut report.skipped_files)? else {
                shared.coordinator.skip_file(index)?;
                continue;
            };
            if handle.is_empty() {
                tracing::debug!(path = %handle.path().display(), file_index = index, "empty input");
                report.files_empty += 1;
                shared.coordinator.skip_file(index)?;
                continue;
            }

            let pages = self.splitter.page_count(handle.len());
            for page in self.splitter.pages(&handle) {
                let page = page?;
                shared.counters.pages_produced.fetch_add(1, Ordering::AcqRel);
                shared
                    .counters
                    .bytes_produced
                    .fetch_add(page.len() as u64, Ordering::AcqRel);
                shared.queue.push(page)?;
            }
            tracing::debug!(
                path = %handle.path().display(),
                file_index = index,
                bytes = handle.len(),
                pages,
                "input queued"
            );
        }

        shared.queue.finish();
        Ok(report)
    }

    fn work(&self, worker_id: usize, shared: &SharedRun) -> Result<()> {
        shared.workers.run_worker(worker_id, &shared.queue, |task| {
            let result = codec::compress_task(&task, &self.buffer_pool)?;
            drop(task);

            let wait_started = Instant::now();
            let token = shared.coordinator.acquire(result.file_index, result.page_index)?;
            shared
                .workers
                .record_turn_wait(worker_id, wait_started.elapsed());

            let is_last_page = result.is_last_page;
            let input_len = result.input_len;
            shared.sequence.append(result)?;
            token.release(is_last_page)?;

            shared.counters.pages_merged.fetch_add(1, Ordering::AcqRel);
            shared
                .counters
                .bytes_merged
                .fetch_add(input_len, Ordering::AcqRel);
            Ok(())
        })
    }

    fn run_parallel<S>(
        &self,
        inputs: Inputs,
        sink: S,
        mut progress: Option<ProgressCallback<'_>>,
    ) -> Result<(S, RunStats)>
    where
        S: RunSink + Send,
    {
        let started_at = Instant::now();
        let files_total = inputs.len();
        let workers = self.config.workers;
        tracing::info!(
            files = files_total,
            workers,
            page_size = self.config.page_size,
            "starting parallel encode"
        );

        let shared = SharedRun {
            queue: WorkQueue::with_capacity_limit(self.config.queue_capacity),
            coordinator: OrderingCoordinator::new(workers),
            sequence: ResultSequence::new(),
            workers: WorkerPool::with_telemetry(workers, Arc::clone(&self.telemetry)),
            signals: CollectorSignals::default(),
            counters: RunCounters::default(),
            first_error: Mutex::new(None),
        };
        let poll_interval = self.config.collector_poll_interval;

        let (collected, producer_report) = thread::scope(|scope| {
            let shared = &shared;
            let inputs = &inputs;

            let collector = scope.spawn(move || {
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    run_collector(&shared.sequence, sink, &shared.signals, poll_interval)
                }))
                .unwrap_or_else(|payload| {
                    Err(PzipError::Worker(format!(
                        "collector panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                });
                outcome.map_err(|error| shared.fail(error)).ok()
            });

            let producer = scope.spawn(move || {
                let outcome = catch_unwind(AssertUnwindSafe(|| self.produce(inputs, shared)))
                    .unwrap_or_else(|payload| {
                        Err(PzipError::Worker(format!(
                            "producer panicked: {}",
                            panic_message(payload.as_ref())
                        )))
                    });
                outcome.map_err(|error| shared.fail(error)).ok()
            });

            let (done_tx, done_rx) = bounded::<()>(0);
            let worker_handles: Vec<_> = (0..workers)
                .map(|worker_id| {
                    let done_tx = done_tx.clone();
                    scope.spawn(move || {
                        if let Err(error) = self.work(worker_id, shared) {
                            shared.fail(error);
                        }
                        drop(done_tx);
                    })
                })
                .collect();
            drop(done_tx);

            // Every worker holds a sender; disconnection means all have exited.
            match progress.as_mut() {
                Some((interval, on_progress)) => {
                    let tick = (*interval).max(Duration::from_millis(1));
                    while let Err(RecvTimeoutError::Timeout) = done_rx.recv_timeout(tick) {
                        on_progress(shared.progress(started_at, files_total));
                    }
                }
                None => {
                    let _ = done_rx.recv();
                }
            }

            let producer_report = join_thread(producer, "producer", shared).flatten();
            for handle in worker_handles {
                join_thread(handle, "worker", shared);
            }

            shared.signals.finish_merging();
            shared.sequence.ring();
            let collected = join_thread(collector, "collector", shared).flatten();
            (collected, producer_report)
        });

        if let Some(error) = shared.take_error() {
            tracing::debug!(%error, "parallel encode aborted");
            return Err(error);
        }
        let (Some((sink, collector_stats)), Some(producer_report)) = (collected, producer_report)
        else {
            return Err(PzipError::Worker(
                "pipeline thread exited without a result".to_string(),
            ));
        };
        if !shared.coordinator.is_complete(files_total) {
            return Err(PzipError::ProtocolViolation(format!(
                "run ended with file {} of {files_total} still active",
                shared.coordinator.active_file()
            )));
        }

        if let Some((_, on_progress)) = progress.as_mut() {
            on_progress(shared.progress(started_at, files_total));
        }

        let mut stats = RunStats::new(EncodeMode::Parallel, files_total);
        stats.files_empty = producer_report.files_empty;
        stats.skipped_files = producer_report.skipped_files;
        stats.pages_total = shared.counters.pages_produced.load(Ordering::Acquire);
        stats.input_bytes = shared.counters.bytes_produced.load(Ordering::Acquire);
        stats.runs_total = shared.sequence.total_runs();
        stats.boundary_merges = shared.sequence.boundary_merges();
        stats.output = sink.summary();
        stats.workers = shared.workers.runtime_snapshot(0).workers;
        stats.elapsed = started_at.elapsed();

        tracing::info!(
            files = stats.files_total,
            pages = stats.pages_total,
            input_bytes = stats.input_bytes,
            runs = stats.runs_total,
            records = stats.output.records,
            collector_flushes = collector_stats.flushes,
            peak_buffered_runs = shared.sequence.peak_buffered(),
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "parallel encode finished"
        );

        Ok((sink, stats))
    }

    fn run_sequential<S: RunSink>(&self, inputs: Inputs, mut sink: S) -> Result<(S, RunStats)> {
        let started_at = Instant::now();
        let mut stats = RunStats::new(EncodeMode::Sequential, inputs.len());
        tracing::info!(files = stats.files_total, "starting sequential encode");

        for index in 0..inputs.len() {
            let Some(handle) = self.open_input(&inputs, index, &mut stats.skipped_files)? else {
                continue;
            };
            if handle.is_empty() {
                stats.files_empty += 1;
                continue;
            }

            // Each file gets its own encoder: runs never span two files.
            let mut encoder = SequentialEncoder::new();
            for page in self.splitter.pages(&handle) {
                let page = page?;
                stats.pages_total += 1;
                stats.input_bytes += page.len() as u64;
                encoder.update(page.data(), |run| {
                    stats.runs_total += 1;
                    sink.write_run(&run)
                })?;
            }
            if let Some(run) = encoder.finish() {
                stats.runs_total += 1;
                sink.write_run(&run)?;
            }
        }

        sink.finish()?;
        stats.output = sink.summary();
        stats.elapsed = started_at.elapsed();
        tracing::info!(
            files = stats.files_total,
            runs = stats.runs_total,
            records = stats.output.records,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "sequential encode finished"
        );
        Ok((sink, stats))
    }
}

/// Joins a scoped thread, recording a panic as a worker error.
fn join_thread<T>(handle: thread::ScopedJoinHandle<'_, T>, role: &str, shared: &SharedRun) -> Option<T> {
    match handle.join() {
        Ok(value) => Some(value),
        Err(payload) => {
            shared.fail(PzipError::Worker(format!(
                "{role} thread panicked: {}",
                panic_message(payload.as_ref())
            )));
            None
        }
    }
}
