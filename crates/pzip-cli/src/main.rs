use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Parser, ValueEnum};
use pzip_core::{
    EncodeReport, FileErrorPolicy, LengthWidth, PipelineConfig, ProgressSnapshot, RecordFormat,
    RecordReader, RlePipeline, RunStats, SourceKind, WorkerRuntimeSnapshot,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pzip",
    version,
    about = "Parallel run-length encoder",
    long_about = "Run-length encode one or more files, in order, into a single record stream."
)]
#[command(group(ArgGroup::new("source").args(["mmap", "read"])))]
struct Cli {
    /// Input files, encoded in the order given.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Output file (defaults to stdout).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of worker threads (defaults to CPU count).
    #[arg(short = 'j', long = "jobs", default_value_t = num_cpus::get())]
    jobs: usize,

    /// Encode on the calling thread only.
    #[arg(long, default_value_t = false)]
    sequential: bool,

    /// Page size (supports suffixes K/M/G, e.g. 4K, 1M).
    #[arg(long, default_value = "4K", value_parser = parse_size)]
    page_size: usize,

    /// Width of the length field of each record, in bytes.
    #[arg(long, default_value_t = 1, value_parser = parse_length_width)]
    length_width: usize,

    /// Maximum number of queued pages (unbounded when omitted).
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// What to do when an input file cannot be opened.
    #[arg(long, value_enum, default_value_t = FileErrorArg::Abort)]
    on_file_error: FileErrorArg,

    /// Map inputs into memory (default).
    #[arg(long, default_value_t = false)]
    mmap: bool,

    /// Read inputs into memory instead of mapping them.
    #[arg(long, default_value_t = false)]
    read: bool,

    /// Print progress and a summary to stderr.
    #[arg(long, default_value_t = false)]
    stats: bool,

    /// Decode the written output and compare it against the inputs.
    #[arg(long, default_value_t = false, requires = "output")]
    verify: bool,

    /// Write a JSON report of the run to this path.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Progress refresh interval in milliseconds.
    #[arg(long, default_value_t = 250)]
    stats_interval_ms: u64,

    /// Enable debug logging.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FileErrorArg {
    Abort,
    Skip,
}

impl From<FileErrorArg> for FileErrorPolicy {
    fn from(value: FileErrorArg) -> Self {
        match value {
            FileErrorArg::Abort => FileErrorPolicy::Abort,
            FileErrorArg::Skip => FileErrorPolicy::Skip,
        }
    }
}

type Output = Box<dyn Write + Send>;

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = build_config(&cli)?;
    let pipeline = RlePipeline::new(config);
    let output = open_output(cli.output.as_deref())?;
    let writer = pipeline.record_writer(output);

    let (writer, stats) = if cli.sequential {
        pipeline
            .encode_sequential(&cli.files, writer)
            .context("sequential encode failed")?
    } else if cli.stats {
        let interval = Duration::from_millis(cli.stats_interval_ms.max(50));
        let mut progress = ProgressLine::default();
        let outcome = pipeline
            .encode_paths_with_progress(&cli.files, writer, interval, |snapshot| {
                progress.print(&snapshot)
            })
            .context("parallel encode failed")?;
        eprintln!();
        outcome
    } else {
        pipeline
            .encode_paths(&cli.files, writer)
            .context("parallel encode failed")?
    };

    let mut output = writer.into_inner().context("failed to flush output")?;
    output.flush().context("failed to flush output")?;
    drop(output);

    if cli.stats {
        print_summary(&cli, &stats, &pipeline);
    }
    if cli.verify {
        if let Some(output_path) = cli.output.as_deref() {
            verify_output(&cli.files, &stats, output_path, pipeline.config().record_format)?;
            if cli.stats {
                eprintln!("  verify: ok");
            }
        }
    }
    if let Some(report_path) = cli.report.as_deref() {
        write_report(report_path, &stats)?;
    }

    Ok(())
}

fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("pzip=debug,pzip_core=debug,warn")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::new(cli.jobs.max(1));
    config.page_size = cli.page_size.max(1);
    config.queue_capacity = cli.queue_capacity;
    config.record_format = RecordFormat::new(LengthWidth::from_bytes(cli.length_width)?);
    config.file_error_policy = cli.on_file_error.into();
    config.source_kind = if cli.read {
        SourceKind::Read
    } else {
        SourceKind::Mmap
    };
    Ok(config.normalized())
}

fn open_output(path: Option<&Path>) -> Result<Output> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}

/// Streams the decoded output against the inputs that were encoded, one
/// record at a time, so neither side is ever held in memory whole.
fn verify_output(
    inputs: &[PathBuf],
    stats: &RunStats,
    output_path: &Path,
    format: RecordFormat,
) -> Result<()> {
    let encoded = File::open(output_path)
        .with_context(|| format!("failed to open {}", output_path.display()))?;
    let records = RecordReader::new(BufReader::new(encoded), format);

    let mut skipped = stats.skipped_files.iter().peekable();
    let encoded_inputs = inputs.iter().filter(|input| {
        if skipped.peek().is_some_and(|path| path == input) {
            skipped.next();
            false
        } else {
            true
        }
    });
    let mut expected = ExpectedInputs::new(encoded_inputs);

    let mut chunk = vec![0u8; VERIFY_CHUNK];
    let mut decoded = 0u64;
    for record in records {
        let run = record.context("output is not a valid record stream")?;
        let mut remaining = run.length;
        while remaining > 0 {
            let want = usize::try_from(remaining).map_or(chunk.len(), |left| left.min(chunk.len()));
            let read = expected.read(&mut chunk[..want])?;
            if read == 0 {
                bail!(
                    "verification failed: output decodes to more than the {decoded} bytes the inputs hold"
                );
            }
            if let Some(position) = chunk[..read].iter().position(|&byte| byte != run.symbol) {
                let (path, offset) = expected.position();
                bail!(
                    "verification failed: output differs from {} at offset {}",
                    path.map_or_else(|| "<input>".to_string(), |path| path.display().to_string()),
                    offset - read as u64 + position as u64
                );
            }
            remaining -= read as u64;
            decoded += read as u64;
        }
    }

    if expected.read(&mut chunk[..1])? != 0 {
        let (path, offset) = expected.position();
        bail!(
            "verification failed: output ends after {decoded} bytes, {} continues at offset {}",
            path.map_or_else(|| "<input>".to_string(), |path| path.display().to_string()),
            offset - 1
        );
    }
    Ok(())
}

const VERIFY_CHUNK: usize = 64 * 1024;

/// The encoded inputs read back to back as one buffered stream.
struct ExpectedInputs<'a, I: Iterator<Item = &'a PathBuf>> {
    paths: I,
    current: Option<(&'a Path, BufReader<File>)>,
    offset: u64,
}

impl<'a, I: Iterator<Item = &'a PathBuf>> ExpectedInputs<'a, I> {
    fn new(paths: I) -> Self {
        Self {
            paths,
            current: None,
            offset: 0,
        }
    }

    /// Fills part of `buf` from the current input, moving on to the next
    /// input at end of file. Returns zero once every input is exhausted.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            if self.current.is_none() {
                let Some(path) = self.paths.next() else {
                    return Ok(0);
                };
                let file = File::open(path)
                    .with_context(|| format!("failed to open {}", path.display()))?;
                self.offset = 0;
                self.current = Some((path.as_path(), BufReader::new(file)));
            }
            let Some((path, reader)) = self.current.as_mut() else {
                continue;
            };
            let path = *path;
            match reader.read(buf) {
                Ok(0) => self.current = None,
                Ok(read) => {
                    self.offset += read as u64;
                    return Ok(read);
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => {
                    return Err(error).with_context(|| format!("failed to read {}", path.display()));
                }
            }
        }
    }

    /// Input being read and the offset just past the last byte returned.
    fn position(&self) -> (Option<&'a Path>, u64) {
        (self.current.as_ref().map(|(path, _)| *path), self.offset)
    }
}

fn write_report(path: &Path, stats: &RunStats) -> Result<()> {
    let report = EncodeReport::from_stats(stats)
        .with_telemetry_snapshot(true)
        .with_memory_sample(true);
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &report).context("failed to serialize report")?;
    writer.flush()?;
    Ok(())
}

#[derive(Default)]
struct ProgressLine {
    last_bytes: u64,
    last_elapsed: Duration,
    last_busy: Vec<Duration>,
}

impl ProgressLine {
    fn print(&mut self, snapshot: &ProgressSnapshot) {
        let elapsed = snapshot.elapsed;
        let merged = snapshot.bytes_merged;
        let elapsed_secs = elapsed.as_secs_f64().max(1e-6);
        let avg_bps = merged as f64 / elapsed_secs;
        let delta_secs = elapsed.saturating_sub(self.last_elapsed).as_secs_f64();
        let instant_bps = if delta_secs > 0.0 {
            merged.saturating_sub(self.last_bytes) as f64 / delta_secs
        } else {
            avg_bps
        };

        let active_workers = self.active_workers(&snapshot.runtime.workers);

        eprint!(
            "\r\x1b[2Kfile {}/{} | pages {}/{} | data {} | avg {}/s inst {}/s | runs {} | queued {} | active {}/{}",
            (snapshot.active_file + 1).min(snapshot.files_total),
            snapshot.files_total,
            snapshot.pages_merged,
            snapshot.pages_produced,
            format_bytes(merged),
            format_rate(avg_bps),
            format_rate(instant_bps),
            snapshot.runs_written,
            snapshot.queue_depth,
            active_workers,
            snapshot.runtime.workers.len(),
        );
        let _ = io::stderr().flush();

        self.last_bytes = merged;
        self.last_elapsed = elapsed;
    }

    /// Workers whose busy time grew since the previous refresh.
    fn active_workers(&mut self, workers: &[WorkerRuntimeSnapshot]) -> usize {
        let active = workers
            .iter()
            .enumerate()
            .filter(|(slot, worker)| {
                worker.busy > self.last_busy.get(*slot).copied().unwrap_or_default()
            })
            .count();
        self.last_busy = workers.iter().map(|worker| worker.busy).collect();
        active
    }
}

fn print_summary(cli: &Cli, stats: &RunStats, pipeline: &RlePipeline) {
    let elapsed_secs = stats.elapsed.as_secs_f64().max(1e-6);
    let read_avg_bps = stats.input_bytes as f64 / elapsed_secs;
    let ratio = if stats.input_bytes > 0 {
        stats.output.bytes as f64 / stats.input_bytes as f64
    } else {
        1.0
    };
    let output = cli
        .output
        .as_deref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<stdout>".to_string());

    eprintln!("encode complete ({})", stats.mode.label());
    eprintln!("  output: {output}");
    eprintln!(
        "  files: {} total | {} empty | {} skipped",
        stats.files_total,
        stats.files_empty,
        stats.skipped_files.len()
    );
    for path in &stats.skipped_files {
        eprintln!("    skipped {}", path.display());
    }
    eprintln!("  elapsed: {}", format_duration(stats.elapsed));
    eprintln!("  input bytes: {}", format_bytes(stats.input_bytes));
    eprintln!("  output bytes: {}", format_bytes(stats.output.bytes));
    eprintln!("  output/input ratio: {ratio:.3}x");
    eprintln!("  throughput avg: {}/s", format_rate(read_avg_bps));
    eprintln!(
        "  pages: {} of {} | runs {} | boundary merges {} | records {}",
        stats.pages_total,
        format_bytes(pipeline.config().page_size as u64),
        stats.runs_total,
        stats.boundary_merges,
        stats.output.records,
    );
    eprintln!("  output crc32: {:08x}", stats.output.crc32);

    if stats.workers.is_empty() {
        return;
    }
    let max_pages = stats
        .workers
        .iter()
        .map(|worker| worker.tasks_completed)
        .max()
        .unwrap_or(0);
    let min_pages = stats
        .workers
        .iter()
        .map(|worker| worker.tasks_completed)
        .min()
        .unwrap_or(0);
    eprintln!(
        "  scheduler: {} workers | page balance min/max {min_pages}/{max_pages}",
        stats.workers.len()
    );
    eprintln!("  worker runtime:");
    for worker in &stats.workers {
        eprintln!(
            "    w{:02} pages {:>6} | busy {:>8} | idle {:>8} | turn wait {:>8} | util {:>6.2}%",
            worker.worker_id,
            worker.tasks_completed,
            format_duration(worker.busy),
            format_duration(worker.idle),
            format_duration(worker.turn_wait),
            worker.utilization * 100.0,
        );
    }

    let pool = pipeline.buffer_pool().metrics();
    eprintln!(
        "  run buffers: created {} | recycled {} | dropped {}",
        pool.created, pool.recycled, pool.dropped
    );
}

fn parse_length_width(value: &str) -> Result<usize, String> {
    let width: usize = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid length width: {value}"))?;
    LengthWidth::from_bytes(width)
        .map(LengthWidth::bytes)
        .map_err(|error| error.to_string())
}

fn parse_size(value: &str) -> Result<usize, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("size cannot be empty".to_string());
    }

    let split_at = trimmed
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (num_part, suffix_part) = trimmed.split_at(split_at);
    if num_part.is_empty() {
        return Err(format!("invalid size: {value}"));
    }

    let base: usize = num_part
        .parse()
        .map_err(|_| format!("invalid size number: {value}"))?;
    let multiplier = match suffix_part.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1usize,
        "k" | "kb" => 1024,
        "m" | "mb" => 1024 * 1024,
        "g" | "gb" => 1024 * 1024 * 1024,
        other => return Err(format!("invalid size suffix '{other}' in '{value}'")),
    };

    let size = base
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: {value}"))?;
    if size == 0 {
        return Err("size must be at least one byte".to_string());
    }
    Ok(size)
}

const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[unit])
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

fn format_rate(bytes_per_second: f64) -> String {
    if !bytes_per_second.is_finite() || bytes_per_second <= 0.0 {
        return "0 B".to_string();
    }

    let mut value = bytes_per_second;
    let mut unit = 0usize;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{value:.0} {}", UNITS[unit])
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let millis = duration.subsec_millis();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else if minutes > 0 {
        format!("{minutes:02}:{seconds:02}")
    } else {
        format!("{seconds}.{millis:03}s")
    }
}
