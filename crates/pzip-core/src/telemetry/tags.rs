/// Profiling target for file source operations.
pub const PROFILE_SOURCE: &str = "pzip.profile.source";
/// Profiling target for page splitting.
pub const PROFILE_SPLITTER: &str = "pzip.profile.splitter";
/// Profiling target for the page compressor.
pub const PROFILE_CODEC: &str = "pzip.profile.codec";
/// Profiling target for run buffer pool operations.
pub const PROFILE_BUFFER: &str = "pzip.profile.buffer";
/// Profiling target for worker runtime.
pub const PROFILE_WORKER: &str = "pzip.profile.worker";
/// Profiling target for ordering and merge operations.
pub const PROFILE_ORDERING: &str = "pzip.profile.ordering";
/// Profiling target for the collector and record writer.
pub const PROFILE_COLLECTOR: &str = "pzip.profile.collector";

/// Global system-level tag shared by all profiling events.
pub const TAG_SYSTEM: &str = "system";
pub const TAG_SOURCE: &str = "source";
pub const TAG_SPLITTER: &str = "splitter";
pub const TAG_CODEC: &str = "codec";
pub const TAG_BUFFER: &str = "buffer";
pub const TAG_WORKER: &str = "worker";
pub const TAG_ORDERING: &str = "ordering";
pub const TAG_COLLECTOR: &str = "collector";
pub const TAG_MEMORY: &str = "memory";

pub const METRIC_SOURCE_OPEN_COUNT: &str = "pzip.source.open.count";
pub const METRIC_SOURCE_OPEN_FAIL_COUNT: &str = "pzip.source.open.fail.count";
pub const METRIC_SOURCE_OPEN_LATENCY_US: &str = "pzip.source.open.latency_us";
pub const METRIC_SOURCE_BYTES: &str = "pzip.source.bytes";

pub const METRIC_SPLITTER_PAGE_COUNT: &str = "pzip.splitter.page.count";
pub const METRIC_SPLITTER_EMPTY_FILE_COUNT: &str = "pzip.splitter.empty_file.count";

pub const METRIC_CODEC_PAGE_COUNT: &str = "pzip.codec.page.count";
pub const METRIC_CODEC_PAGE_LATENCY_US: &str = "pzip.codec.page.latency_us";
pub const METRIC_CODEC_INPUT_BYTES: &str = "pzip.codec.input_bytes";
pub const METRIC_CODEC_OUTPUT_RUNS: &str = "pzip.codec.output_runs";

pub const METRIC_BUFFER_ACQUIRE_CREATED_COUNT: &str = "pzip.buffer.acquire.created.count";
pub const METRIC_BUFFER_ACQUIRE_RECYCLED_COUNT: &str = "pzip.buffer.acquire.recycled.count";
pub const METRIC_BUFFER_ACQUIRE_LATENCY_US: &str = "pzip.buffer.acquire.latency_us";
pub const METRIC_BUFFER_RECYCLE_OK_COUNT: &str = "pzip.buffer.recycle.ok.count";
pub const METRIC_BUFFER_RECYCLE_DROPPED_COUNT: &str = "pzip.buffer.recycle.dropped.count";
pub const METRIC_BUFFER_RECYCLE_LATENCY_US: &str = "pzip.buffer.recycle.latency_us";

pub const METRIC_WORKER_TASK_COUNT: &str = "pzip.worker.task.count";
pub const METRIC_WORKER_TASK_START_COUNT: &str = "pzip.worker.task.start.count";
pub const METRIC_WORKER_TASK_FINISH_COUNT: &str = "pzip.worker.task.finish.count";
pub const METRIC_WORKER_TASK_FAIL_COUNT: &str = "pzip.worker.task.fail.count";
pub const METRIC_WORKER_TASK_LATENCY_US: &str = "pzip.worker.task.latency_us";
pub const METRIC_WORKER_QUEUE_DEPTH: &str = "pzip.worker.queue.depth";
pub const METRIC_WORKER_QUEUE_DEPTH_SAMPLES: &str = "pzip.worker.queue.depth.samples";
pub const METRIC_WORKER_QUEUE_DEPTH_HIST: &str = "pzip.worker.queue.depth.hist";
pub const METRIC_WORKER_ACTIVE_COUNT: &str = "pzip.worker.active.count";

pub const METRIC_ORDERING_TURN_WAIT_US: &str = "pzip.ordering.turn_wait_us";
pub const METRIC_ORDERING_FILE_ADVANCE_COUNT: &str = "pzip.ordering.file_advance.count";
pub const METRIC_ORDERING_MERGE_COUNT: &str = "pzip.ordering.merge.count";
pub const METRIC_ORDERING_BOUNDARY_MERGE_COUNT: &str = "pzip.ordering.boundary_merge.count";

pub const METRIC_COLLECTOR_FLUSH_COUNT: &str = "pzip.collector.flush.count";
pub const METRIC_COLLECTOR_RUNS_WRITTEN: &str = "pzip.collector.runs_written";
pub const METRIC_COLLECTOR_BACKLOG_RUNS: &str = "pzip.collector.backlog_runs";
pub const METRIC_RECORD_WRITE_COUNT: &str = "pzip.record.write.count";
pub const METRIC_RECORD_SPLIT_COUNT: &str = "pzip.record.split.count";

pub const METRIC_MEMORY_PROCESS_RSS_BYTES: &str = "pzip.memory.process.rss_bytes";
pub const METRIC_MEMORY_PROCESS_VIRTUAL_BYTES: &str = "pzip.memory.process.virtual_bytes";
pub const METRIC_MEMORY_POOL_ESTIMATED_BYTES: &str = "pzip.memory.pool.estimated_bytes";
