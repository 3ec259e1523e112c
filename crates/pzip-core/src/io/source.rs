use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use memmap2::{Mmap, MmapOptions};
use serde::{Deserialize, Serialize};

use crate::PzipError;
use crate::telemetry;
use crate::telemetry::profile;
use crate::telemetry::tags;
use crate::types::{PageData, Result};

const PROFILE_TAG_STACK_SOURCE: [&str; 2] = [tags::TAG_SYSTEM, tags::TAG_SOURCE];

/// Opens input files for encoding.
///
/// Failures are reported as [`PzipError::FileAccess`] so the pipeline can
/// apply its file error policy uniformly.
pub trait FileSource: Send + Sync {
    fn open(&self, file_index: usize, path: &Path) -> Result<FileHandle>;
}

/// How input files are brought into memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// Memory map the file; pages borrow from the shared map.
    #[default]
    Mmap,
    /// Read the whole file into an owned buffer.
    Read,
}

impl FileSource for SourceKind {
    fn open(&self, file_index: usize, path: &Path) -> Result<FileHandle> {
        match self {
            Self::Mmap => MmapFileSource.open(file_index, path),
            Self::Read => ReadFileSource.open(file_index, path),
        }
    }
}

#[derive(Debug, Clone)]
enum FileData {
    Empty,
    Mapped(Arc<Mmap>),
    Owned(Bytes),
}

/// An opened input file, shared read-only by every page cut from it.
///
/// Cloning is cheap: the underlying map or buffer is reference counted and
/// stays alive as long as any handle or page still points into it.
#[derive(Debug, Clone)]
pub struct FileHandle {
    file_index: usize,
    path: PathBuf,
    len: u64,
    data: FileData,
}

impl FileHandle {
    /// Wraps in-memory contents, mostly for tests and embedding.
    pub fn from_bytes(file_index: usize, path: impl Into<PathBuf>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let len = data.len() as u64;
        Self {
            file_index,
            path: path.into(),
            len,
            data: if data.is_empty() {
                FileData::Empty
            } else {
                FileData::Owned(data)
            },
        }
    }

    pub fn file_index(&self) -> usize {
        self.file_index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the byte range `start..end` as page data without copying.
    ///
    /// # Errors
    /// Returns [`PzipError::InvalidFormat`] if the range lies outside the file.
    pub fn page(&self, start: u64, end: u64) -> Result<PageData> {
        let (start, end) = self.validate_range(start, end)?;
        Ok(match &self.data {
            FileData::Empty => PageData::Owned(Bytes::new()),
            FileData::Mapped(map) => PageData::Mapped {
                map: Arc::clone(map),
                start,
                end,
            },
            FileData::Owned(bytes) => PageData::Owned(bytes.slice(start..end)),
        })
    }

    /// Whole file contents as one slice.
    pub fn as_slice(&self) -> &[u8] {
        match &self.data {
            FileData::Empty => &[],
            FileData::Mapped(map) => &map[..],
            FileData::Owned(bytes) => &bytes[..],
        }
    }

    fn validate_range(&self, start: u64, end: u64) -> Result<(usize, usize)> {
        if start > end || end > self.len {
            return Err(PzipError::InvalidFormat("page range outside file"));
        }

        let start = usize::try_from(start)
            .map_err(|_| PzipError::InvalidFormat("page start overflow"))?;
        let end = usize::try_from(end).map_err(|_| PzipError::InvalidFormat("page end overflow"))?;

        Ok((start, end))
    }
}

/// Memory-maps input files.
///
/// Zero-length files are never mapped (mapping an empty file fails on some
/// platforms); they open as empty handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct MmapFileSource;

impl FileSource for MmapFileSource {
    fn open(&self, file_index: usize, path: &Path) -> Result<FileHandle> {
        timed_open("mmap", path, || {
            let file = File::open(path).map_err(|source| PzipError::file_access(path, source))?;
            let metadata_len = file
                .metadata()
                .map_err(|source| PzipError::file_access(path, source))?
                .len();
            map_file(file_index, path, &file, metadata_len)
        })
    }
}

/// Maps `file` unless the metadata reports it empty.
///
/// Pages slice the map, so the handle takes the map's length even if the
/// file changed size after `metadata_len` was read.
fn map_file(file_index: usize, path: &Path, file: &File, metadata_len: u64) -> Result<FileHandle> {
    let (len, data) = if metadata_len == 0 {
        (0, FileData::Empty)
    } else {
        // SAFETY: the map is read-only; inputs are assumed not to be
        // truncated by another process while the run is in progress.
        let map = unsafe { MmapOptions::new().map(file) }
            .map_err(|source| PzipError::file_access(path, source))?;
        if map.is_empty() {
            (0, FileData::Empty)
        } else {
            (map.len() as u64, FileData::Mapped(Arc::new(map)))
        }
    };

    Ok(FileHandle {
        file_index,
        path: path.to_path_buf(),
        len,
        data,
    })
}

/// Reads input files fully into memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadFileSource;

impl FileSource for ReadFileSource {
    fn open(&self, file_index: usize, path: &Path) -> Result<FileHandle> {
        timed_open("read", path, || {
            let mut file =
                File::open(path).map_err(|source| PzipError::file_access(path, source))?;
            let expected = file
                .metadata()
                .map(|metadata| metadata.len())
                .unwrap_or(0);

            let mut buffer = Vec::new();
            buffer.try_reserve(usize::try_from(expected).unwrap_or(0))?;
            file.read_to_end(&mut buffer)
                .map_err(|source| PzipError::file_access(path, source))?;

            Ok(FileHandle::from_bytes(file_index, path, buffer))
        })
    }
}

fn timed_open(
    kind: &'static str,
    path: &Path,
    open: impl FnOnce() -> Result<FileHandle>,
) -> Result<FileHandle> {
    let started_at = Instant::now();
    let result = open();
    let elapsed_us = profile::elapsed_us(started_at);

    telemetry::increment_counter(
        tags::METRIC_SOURCE_OPEN_COUNT,
        1,
        &[("subsystem", "source"), ("op", "open"), ("kind", kind)],
    );
    telemetry::record_histogram(
        tags::METRIC_SOURCE_OPEN_LATENCY_US,
        elapsed_us,
        &[("subsystem", "source"), ("op", "open"), ("kind", kind)],
    );

    match &result {
        Ok(handle) => {
            telemetry::increment_counter(
                tags::METRIC_SOURCE_BYTES,
                handle.len(),
                &[("subsystem", "source"), ("op", "open")],
            );
            profile::event(
                tags::PROFILE_SOURCE,
                &PROFILE_TAG_STACK_SOURCE,
                "open",
                "ok",
                elapsed_us,
                "source open completed",
            );
            tracing::debug!(
                path = %path.display(),
                file_index = handle.file_index(),
                len = handle.len(),
                kind,
                "opened input"
            );
        }
        Err(_) => {
            telemetry::increment_counter(
                tags::METRIC_SOURCE_OPEN_FAIL_COUNT,
                1,
                &[("subsystem", "source"), ("op", "open"), ("result", "error")],
            );
            profile::event(
                tags::PROFILE_SOURCE,
                &PROFILE_TAG_STACK_SOURCE,
                "open",
                "error",
                elapsed_us,
                "source open failed",
            );
        }
    }

    result
}
