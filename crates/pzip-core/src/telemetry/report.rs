use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::WorkerRuntimeSnapshot;
use crate::pipeline::{EncodeMode, RunStats};
use crate::telemetry::{self, ProcessMemorySample, TelemetrySnapshot};
use crate::types::duration_to_us;

/// Extensible scalar value used by report exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReportValue {
    U64(u64),
    F64(f64),
    Duration(Duration),
    Bool(bool),
    Text(String),
}

/// Worker-level metrics used in exported reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub worker_id: usize,
    /// Pages compressed and merged by this worker.
    pub pages_completed: usize,
    pub uptime: Duration,
    pub busy: Duration,
    pub idle: Duration,
    /// Ratio of busy time to uptime.
    pub utilization: f64,
    /// Time spent waiting for the worker's merge turn.
    pub turn_wait: Duration,
}

impl WorkerReport {
    pub fn from_runtime(runtime: &WorkerRuntimeSnapshot) -> Self {
        Self {
            worker_id: runtime.worker_id,
            pages_completed: runtime.tasks_completed,
            uptime: runtime.uptime,
            busy: runtime.busy,
            idle: runtime.idle,
            utilization: runtime.utilization,
            turn_wait: runtime.turn_wait,
        }
    }
}

/// Summary of one encoding run, suitable for JSON export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeReport {
    pub mode: EncodeMode,
    pub elapsed: Duration,
    pub files_total: usize,
    pub files_empty: usize,
    pub files_skipped: Vec<String>,
    pub pages_total: u64,
    pub input_bytes_total: u64,
    pub runs_total: u64,
    pub boundary_merges: u64,
    pub records_total: u64,
    pub output_bytes_total: u64,
    pub output_crc32: u32,
    /// Average input throughput in bytes per second.
    pub read_avg_bps: f64,
    /// Ratio of output size to input size.
    pub output_input_ratio: f64,
    pub workers: Vec<WorkerReport>,
    pub extensions: BTreeMap<String, ReportValue>,
    pub memory: Option<ProcessMemorySample>,
    pub telemetry: Option<TelemetrySnapshot>,
}

impl EncodeReport {
    pub fn from_stats(stats: &RunStats) -> Self {
        let elapsed_secs = stats.elapsed.as_secs_f64().max(1e-6);
        let output_input_ratio = if stats.input_bytes == 0 {
            1.0
        } else {
            stats.output.bytes as f64 / stats.input_bytes as f64
        };

        Self {
            mode: stats.mode,
            elapsed: stats.elapsed,
            files_total: stats.files_total,
            files_empty: stats.files_empty,
            files_skipped: stats
                .skipped_files
                .iter()
                .map(|path| path.display().to_string())
                .collect(),
            pages_total: stats.pages_total,
            input_bytes_total: stats.input_bytes,
            runs_total: stats.runs_total,
            boundary_merges: stats.boundary_merges,
            records_total: stats.output.records,
            output_bytes_total: stats.output.bytes,
            output_crc32: stats.output.crc32,
            read_avg_bps: stats.input_bytes as f64 / elapsed_secs,
            output_input_ratio,
            workers: stats.workers.iter().map(WorkerReport::from_runtime).collect(),
            extensions: BTreeMap::new(),
            memory: None,
            telemetry: None,
        }
    }

    /// Optionally attaches a telemetry snapshot to the report.
    pub fn with_telemetry_snapshot(mut self, include: bool) -> Self {
        self.telemetry = include.then(telemetry::snapshot);
        self
    }

    /// Optionally attaches a process memory sample to the report.
    pub fn with_memory_sample(mut self, include: bool) -> Self {
        self.memory = include.then(telemetry::sample_process_memory);
        self
    }

    pub fn insert_extension(&mut self, key: impl Into<String>, value: ReportValue) {
        self.extensions.insert(key.into(), value);
    }
}

/// Common export shape for report types.
pub trait ReportExport {
    fn to_flat_map(&self) -> BTreeMap<String, ReportValue>;
}

impl ReportExport for EncodeReport {
    fn to_flat_map(&self) -> BTreeMap<String, ReportValue> {
        let mut out = BTreeMap::new();
        let mut put = |key: &str, value: ReportValue| {
            out.insert(format!("encode.{key}"), value);
        };

        put("mode", ReportValue::Text(self.mode.label().to_string()));
        put("elapsed_us", ReportValue::U64(duration_to_us(self.elapsed)));
        put("files_total", ReportValue::U64(self.files_total as u64));
        put("files_empty", ReportValue::U64(self.files_empty as u64));
        put(
            "files_skipped",
            ReportValue::U64(self.files_skipped.len() as u64),
        );
        put("pages_total", ReportValue::U64(self.pages_total));
        put("input_bytes_total", ReportValue::U64(self.input_bytes_total));
        put("runs_total", ReportValue::U64(self.runs_total));
        put("boundary_merges", ReportValue::U64(self.boundary_merges));
        put("records_total", ReportValue::U64(self.records_total));
        put(
            "output_bytes_total",
            ReportValue::U64(self.output_bytes_total),
        );
        put("output_crc32", ReportValue::U64(u64::from(self.output_crc32)));
        put("read_avg_bps", ReportValue::F64(self.read_avg_bps));
        put(
            "output_input_ratio",
            ReportValue::F64(self.output_input_ratio),
        );
        put("worker_count", ReportValue::U64(self.workers.len() as u64));

        flatten_workers(&self.workers, &mut out);
        for (key, value) in &self.extensions {
            out.insert(format!("encode.extension.{key}"), value.clone());
        }
        if let Some(memory) = &self.memory {
            flatten_memory(memory, &mut out);
        }
        if let Some(snapshot) = &self.telemetry {
            flatten_telemetry(snapshot, &mut out);
        }

        out
    }
}

fn flatten_workers(workers: &[WorkerReport], out: &mut BTreeMap<String, ReportValue>) {
    for worker in workers {
        let prefix = format!("worker.{}", worker.worker_id);
        out.insert(
            format!("{prefix}.pages_completed"),
            ReportValue::U64(worker.pages_completed as u64),
        );
        out.insert(
            format!("{prefix}.busy_us"),
            ReportValue::U64(duration_to_us(worker.busy)),
        );
        out.insert(
            format!("{prefix}.idle_us"),
            ReportValue::U64(duration_to_us(worker.idle)),
        );
        out.insert(
            format!("{prefix}.turn_wait_us"),
            ReportValue::U64(duration_to_us(worker.turn_wait)),
        );
        out.insert(
            format!("{prefix}.utilization"),
            ReportValue::F64(worker.utilization),
        );
    }
}

fn flatten_memory(memory: &ProcessMemorySample, out: &mut BTreeMap<String, ReportValue>) {
    let fields = [
        ("rss_bytes", memory.rss_bytes),
        ("virtual_bytes", memory.virtual_bytes),
        ("peak_rss_bytes", memory.peak_rss_bytes),
    ];
    for (name, value) in fields {
        if let Some(value) = value {
            out.insert(format!("memory.{name}"), ReportValue::U64(value));
        }
    }
}

fn flatten_telemetry(snapshot: &TelemetrySnapshot, out: &mut BTreeMap<String, ReportValue>) {
    for (name, value) in &snapshot.counters {
        out.insert(
            format!("telemetry.counter.{name}"),
            ReportValue::U64(*value),
        );
    }

    for (name, value) in &snapshot.gauges {
        out.insert(format!("telemetry.gauge.{name}"), ReportValue::U64(*value));
    }

    for (name, histogram) in &snapshot.histograms {
        out.insert(
            format!("telemetry.histogram.{name}.count"),
            ReportValue::U64(histogram.count),
        );
        out.insert(
            format!("telemetry.histogram.{name}.max"),
            ReportValue::U64(histogram.max),
        );
        out.insert(
            format!("telemetry.histogram.{name}.mean"),
            ReportValue::F64(histogram.mean),
        );
    }
}
