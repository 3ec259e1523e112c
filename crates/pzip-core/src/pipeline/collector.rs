use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::PzipError;
use crate::format::RunSink;
use crate::telemetry::{self, profile, tags};
use crate::types::{Result, duration_to_us};

use super::ResultSequence;

const PROFILE_TAG_STACK_COLLECTOR: [&str; 2] = [tags::TAG_SYSTEM, tags::TAG_COLLECTOR];

/// Counters reported by the collector thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorStats {
    /// Batches of sealed runs handed to the sink.
    pub flushes: u64,
    pub runs_written: u64,
    /// Largest batch copied out of the sequence at once.
    pub max_batch: u64,
}

/// Signals shared between the pipeline driver and the collector.
#[derive(Debug, Default)]
pub struct CollectorSignals {
    merging_done: AtomicBool,
    aborted: AtomicBool,
    runs_written: AtomicU64,
}

impl CollectorSignals {
    /// Every page has been merged; the collector drains and exits.
    pub fn finish_merging(&self) {
        self.merging_done.store(true, Ordering::Release);
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Runs streamed to the sink so far.
    pub fn runs_written(&self) -> u64 {
        self.runs_written.load(Ordering::Acquire)
    }
}

/// Streams sealed runs from `sequence` into `sink` until merging finishes.
///
/// Intended to run on its own thread next to the workers. Runs are copied
/// out under the sequence lock, discarded from the sequence, and written
/// with the lock released. Once merging is done the tail is sealed, the
/// last runs are flushed, and the sink is finished and handed back.
pub fn run_collector<S: RunSink>(
    sequence: &ResultSequence,
    mut sink: S,
    signals: &CollectorSignals,
    poll_interval: Duration,
) -> Result<(S, CollectorStats)> {
    let mut stats = CollectorStats::default();
    let mut cursor = 0u64;

    loop {
        if signals.is_aborted() {
            return Err(PzipError::Aborted);
        }
        // Read the flag before draining so no append can slip past the final pass.
        let finished = signals.merging_done.load(Ordering::Acquire);
        if finished {
            sequence.seal();
        }

        let (runs, next) = sequence.read_since(cursor);
        sequence.discard_before(next);
        cursor = next;

        if !runs.is_empty() {
            let started_at = Instant::now();
            for run in &runs {
                sink.write_run(run)?;
            }
            let written = runs.len() as u64;
            stats.flushes += 1;
            stats.runs_written += written;
            stats.max_batch = stats.max_batch.max(written);
            signals.runs_written.fetch_add(written, Ordering::AcqRel);

            let elapsed_us = duration_to_us(started_at.elapsed());
            let labels = [("subsystem", "collector"), ("op", "flush")];
            telemetry::increment_counter(tags::METRIC_COLLECTOR_FLUSH_COUNT, 1, &labels);
            telemetry::increment_counter(tags::METRIC_COLLECTOR_RUNS_WRITTEN, written, &labels);
            telemetry::record_histogram(tags::METRIC_COLLECTOR_BACKLOG_RUNS, written, &labels);
            profile::event(
                tags::PROFILE_COLLECTOR,
                &PROFILE_TAG_STACK_COLLECTOR,
                "flush",
                "ok",
                elapsed_us,
                "collector flushed runs",
            );
        }

        if finished {
            break;
        }
        sequence.wait_doorbell(poll_interval);
    }

    sink.finish()?;
    tracing::debug!(
        runs = stats.runs_written,
        flushes = stats.flushes,
        "collector finished"
    );
    Ok((sink, stats))
}
