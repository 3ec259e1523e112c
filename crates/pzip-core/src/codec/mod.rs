use std::time::Instant;

use crate::buffer::RunBufferPool;
use crate::telemetry::{self, profile, tags};
use crate::types::{PageResult, PageTask, Result, duration_to_us};

pub mod rle;

pub use rle::{SequentialEncoder, compress_page, compress_page_into, encode_sequential};

const PROFILE_TAG_STACK_CODEC: [&str; 2] = [tags::TAG_SYSTEM, tags::TAG_CODEC];

/// Compresses one page task into a pooled run buffer.
pub fn compress_task(task: &PageTask, pool: &RunBufferPool) -> Result<PageResult> {
    let started_at = Instant::now();
    let mut runs = pool.acquire()?;
    compress_page_into(task.data(), runs.as_mut_vec())?;

    let elapsed_us = duration_to_us(started_at.elapsed());
    let labels = [("subsystem", "codec"), ("op", "compress_page")];
    telemetry::increment_counter(tags::METRIC_CODEC_PAGE_COUNT, 1, &labels);
    telemetry::record_histogram(tags::METRIC_CODEC_PAGE_LATENCY_US, elapsed_us, &labels);
    telemetry::record_histogram(tags::METRIC_CODEC_INPUT_BYTES, task.len() as u64, &labels);
    telemetry::record_histogram(tags::METRIC_CODEC_OUTPUT_RUNS, runs.len() as u64, &labels);
    profile::event(
        tags::PROFILE_CODEC,
        &PROFILE_TAG_STACK_CODEC,
        "compress_page",
        "ok",
        elapsed_us,
        "page compressed",
    );

    Ok(PageResult::new(task, runs))
}
