use std::io::Write;

use bytes::{BufMut, BytesMut};
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::telemetry::{self, tags};
use crate::types::{Result, Run};

use super::{LengthWidth, RecordFormat};

const STAGING_FLUSH_BYTES: usize = 64 * 1024;

/// Totals reported by a sink once encoding is done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkSummary {
    /// Runs accepted through [`RunSink::write_run`].
    pub runs: u64,
    /// Wire records emitted (runs above the cap count several times).
    pub records: u64,
    pub bytes: u64,
    /// CRC32 of every byte emitted.
    pub crc32: u32,
}

/// Append-only destination of the ordered run stream.
pub trait RunSink {
    fn write_run(&mut self, run: &Run) -> Result<()>;

    /// Flushes buffered output. Called once after the last run.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    fn summary(&self) -> SinkSummary {
        SinkSummary::default()
    }
}

impl RunSink for Vec<Run> {
    fn write_run(&mut self, run: &Run) -> Result<()> {
        self.try_reserve(1)?;
        self.push(*run);
        Ok(())
    }

    fn summary(&self) -> SinkSummary {
        SinkSummary {
            runs: self.len() as u64,
            ..SinkSummary::default()
        }
    }
}

impl<S: RunSink + ?Sized> RunSink for &mut S {
    fn write_run(&mut self, run: &Run) -> Result<()> {
        (**self).write_run(run)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }

    fn summary(&self) -> SinkSummary {
        (**self).summary()
    }
}

/// Serializes runs as wire records into any writer.
///
/// Runs longer than the format's cap are split into consecutive records of
/// the same symbol; zero-length runs produce nothing.
#[derive(Debug)]
pub struct RecordWriter<W: Write> {
    writer: W,
    format: RecordFormat,
    staging: BytesMut,
    hasher: Hasher,
    runs: u64,
    records: u64,
    split_runs: u64,
    bytes: u64,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(writer: W) -> Self {
        Self::with_format(writer, RecordFormat::default())
    }

    pub fn with_format(writer: W, format: RecordFormat) -> Self {
        Self {
            writer,
            format,
            staging: BytesMut::with_capacity(STAGING_FLUSH_BYTES),
            hasher: Hasher::new(),
            runs: 0,
            records: 0,
            split_runs: 0,
            bytes: 0,
        }
    }

    pub fn format(&self) -> RecordFormat {
        self.format
    }

    pub fn records_written(&self) -> u64 {
        self.records
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    /// Runs that needed more than one record.
    pub fn split_runs(&self) -> u64 {
        self.split_runs
    }

    /// Flushes staged records and returns the inner writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.flush_staging()?;
        Ok(self.writer)
    }

    fn put_record(&mut self, symbol: u8, length: u64) {
        self.staging.put_u8(symbol);
        match self.format.length_width {
            LengthWidth::One => self.staging.put_u8(length as u8),
            LengthWidth::Two => self.staging.put_u16_le(length as u16),
            LengthWidth::Four => self.staging.put_u32_le(length as u32),
        }
        self.records += 1;
    }

    fn flush_staging(&mut self) -> Result<()> {
        if self.staging.is_empty() {
            return Ok(());
        }
        self.writer.write_all(&self.staging)?;
        self.hasher.update(&self.staging);
        self.bytes += self.staging.len() as u64;
        self.staging.clear();
        Ok(())
    }
}

impl<W: Write> RunSink for RecordWriter<W> {
    fn write_run(&mut self, run: &Run) -> Result<()> {
        if run.length == 0 {
            return Ok(());
        }

        let cap = self.format.max_run();
        let mut remaining = run.length;
        if remaining > cap {
            self.split_runs += 1;
            telemetry::increment_counter(
                tags::METRIC_RECORD_SPLIT_COUNT,
                1,
                &[("subsystem", "record"), ("op", "split")],
            );
        }
        while remaining > 0 {
            let length = remaining.min(cap);
            self.put_record(run.symbol, length);
            remaining -= length;
            if self.staging.len() >= STAGING_FLUSH_BYTES {
                self.flush_staging()?;
            }
        }
        self.runs += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.flush_staging()?;
        self.writer.flush()?;
        telemetry::increment_counter(
            tags::METRIC_RECORD_WRITE_COUNT,
            self.records,
            &[("subsystem", "record"), ("op", "write")],
        );
        Ok(())
    }

    fn summary(&self) -> SinkSummary {
        SinkSummary {
            runs: self.runs,
            records: self.records,
            bytes: self.bytes,
            crc32: self.hasher.clone().finalize(),
        }
    }
}
