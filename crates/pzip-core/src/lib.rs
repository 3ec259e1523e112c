pub mod buffer;
pub mod codec;
pub mod core;
pub mod error;
pub mod format;
pub mod io;
pub mod pipeline;
pub mod telemetry;
pub mod types;

pub use buffer::{PoolMetricsSnapshot, PooledRuns, RunBufferPool};
pub use codec::{SequentialEncoder, compress_page, compress_page_into, encode_sequential};
pub use core::{
    OrderingCoordinator, PoolRuntimeSnapshot, TurnToken, WorkQueue, WorkerPool,
    WorkerRuntimeSnapshot,
};
pub use error::PzipError;
pub use format::{
    LengthWidth, RecordFormat, RecordReader, RecordWriter, RunSink, SinkSummary, decode_records,
    expand_records,
};
pub use io::{
    DEFAULT_PAGE_SIZE, FileHandle, FileSource, MmapFileSource, PageSplitter, ReadFileSource,
    SourceKind,
};
pub use pipeline::{
    CollectorStats, EncodeMode, PipelineConfig, ProgressSnapshot, ResultSequence, RlePipeline,
    RunStats,
};
pub use telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
pub use telemetry::{EncodeReport, ReportExport, ReportValue, WorkerReport};
pub use types::{FileErrorPolicy, PageData, PageResult, PageTask, Result, Run};
