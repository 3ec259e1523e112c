use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::buffer::PooledRuns;
use crate::error::PzipError;

pub type Result<T> = std::result::Result<T, PzipError>;

/// Converts a duration to whole microseconds, clamped to `u64::MAX`.
#[inline]
pub fn duration_to_us(duration: Duration) -> u64 {
    duration.as_micros().min(u64::MAX as u128) as u64
}

/// A maximal run of one byte value.
///
/// The length is unbounded here; the wire format splits runs that exceed
/// its length cap into several records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Run {
    pub symbol: u8,
    pub length: u64,
}

impl Run {
    pub fn new(symbol: u8, length: u64) -> Self {
        Self { symbol, length }
    }
}

/// Bytes of one page, either owned or borrowed from a shared memory map.
#[derive(Debug, Clone)]
pub enum PageData {
    Owned(Bytes),
    Mapped {
        map: Arc<Mmap>,
        start: usize,
        end: usize,
    },
}

impl PageData {
    pub fn len(&self) -> usize {
        match self {
            Self::Owned(data) => data.len(),
            Self::Mapped { start, end, .. } => end - start,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Owned(data) => &data[..],
            Self::Mapped { map, start, end } => &map[*start..*end],
        }
    }

    /// Converts the page to an owned `Bytes`.
    ///
    /// Owned data is a cheap reference-counted clone; mapped data is copied.
    pub fn to_owned(&self) -> Bytes {
        match self {
            Self::Owned(data) => data.clone(),
            Self::Mapped { map, start, end } => Bytes::copy_from_slice(&map[*start..*end]),
        }
    }
}

/// One fixed-size slice of an input file, the unit of parallel work.
#[derive(Debug, Clone)]
pub struct PageTask {
    pub file_index: usize,
    pub page_index: u64,
    pub data: PageData,
    pub is_last_page: bool,
}

impl PageTask {
    pub fn new(file_index: usize, page_index: u64, data: PageData, is_last_page: bool) -> Self {
        Self {
            file_index,
            page_index,
            data,
            is_last_page,
        }
    }

    /// Creates a task over owned bytes.
    pub fn from_bytes(
        file_index: usize,
        page_index: u64,
        data: impl Into<Bytes>,
        is_last_page: bool,
    ) -> Self {
        Self::new(
            file_index,
            page_index,
            PageData::Owned(data.into()),
            is_last_page,
        )
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }
}

/// Runs produced by compressing one [`PageTask`].
#[derive(Debug)]
pub struct PageResult {
    pub file_index: usize,
    pub page_index: u64,
    pub is_last_page: bool,
    pub input_len: u64,
    pub runs: PooledRuns,
}

impl PageResult {
    pub fn new(task: &PageTask, runs: PooledRuns) -> Self {
        Self {
            file_index: task.file_index,
            page_index: task.page_index,
            is_last_page: task.is_last_page,
            input_len: task.len() as u64,
            runs,
        }
    }

    /// Builds a result from plain runs that do not belong to any buffer pool.
    pub fn from_runs(file_index: usize, page_index: u64, is_last_page: bool, runs: Vec<Run>) -> Self {
        let input_len = runs.iter().map(|run| run.length).sum();
        Self {
            file_index,
            page_index,
            is_last_page,
            input_len,
            runs: PooledRuns::detached(runs),
        }
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }
}

/// What to do when an input file cannot be opened or mapped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileErrorPolicy {
    /// Stop the whole run with the file access error.
    #[default]
    Abort,
    /// Log the failure, treat the file as empty, and keep going.
    Skip,
}
