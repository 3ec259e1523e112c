use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::PzipError;
use crate::telemetry::{self, profile, tags};
use crate::types::Result;

const PROFILE_TAG_STACK_ORDERING: [&str; 2] = [tags::TAG_SYSTEM, tags::TAG_ORDERING];

/// One slot of the turn ring. Holds the page index it is open for.
#[derive(Debug, Default)]
struct TurnGate {
    open_for: Mutex<Option<u64>>,
    opened: Condvar,
}

#[derive(Debug, Default)]
struct FileProgress {
    active: usize,
    /// Files known to contribute no pages, not yet reached by `active`.
    empty: BTreeSet<usize>,
}

impl FileProgress {
    fn advance_past(&mut self, file_index: usize) -> usize {
        self.active = file_index + 1;
        while self.empty.remove(&self.active) {
            self.active += 1;
        }
        self.active
    }
}

/// Serializes merges into strict `(file, page)` order.
///
/// Pages are compressed in any order; before merging, a worker acquires
/// the turn for its page. Page `p` of the active file maps to gate
/// `p % slots`. Gate 0 starts open for page 0 and every release opens the
/// gate of the following page, so exactly one page can merge at a time and
/// always the next one in sequence. Workers holding a page of a later file
/// wait until the active-file counter reaches it.
#[derive(Debug)]
pub struct OrderingCoordinator {
    gates: Vec<TurnGate>,
    files: Mutex<FileProgress>,
    file_advanced: Condvar,
    aborted: AtomicBool,
}

impl OrderingCoordinator {
    /// Creates a coordinator with one turn gate per worker slot.
    pub fn new(slots: usize) -> Self {
        let gates: Vec<TurnGate> = (0..slots.max(1)).map(|_| TurnGate::default()).collect();
        *lock(&gates[0].open_for) = Some(0);
        Self {
            gates,
            files: Mutex::new(FileProgress::default()),
            file_advanced: Condvar::new(),
            aborted: AtomicBool::new(false),
        }
    }

    pub fn slots(&self) -> usize {
        self.gates.len()
    }

    /// Index of the file currently allowed to merge.
    pub fn active_file(&self) -> usize {
        lock(&self.files).active
    }

    /// Blocks until `file_index` is the active file.
    ///
    /// # Errors
    /// [`PzipError::Aborted`] if the run is aborted while waiting, and
    /// [`PzipError::ProtocolViolation`] if the file has already been passed.
    pub fn wait_for_file(&self, file_index: usize) -> Result<()> {
        let mut files = lock(&self.files);
        loop {
            if self.is_aborted() {
                return Err(PzipError::Aborted);
            }
            if files.active == file_index {
                return Ok(());
            }
            if files.active > file_index {
                return Err(PzipError::ProtocolViolation(format!(
                    "page of file {file_index} arrived after the file was completed (active file {})",
                    files.active
                )));
            }
            files = wait(&self.file_advanced, files);
        }
    }

    /// Waits for the merge turn of page `page_index` of `file_index`.
    pub fn acquire(&self, file_index: usize, page_index: u64) -> Result<TurnToken<'_>> {
        self.wait_for_file(file_index)?;

        let slot = self.slot_of(page_index);
        let gate = &self.gates[slot];
        let mut open_for = lock(&gate.open_for);
        loop {
            if self.is_aborted() {
                return Err(PzipError::Aborted);
            }
            if *open_for == Some(page_index) {
                *open_for = None;
                return Ok(TurnToken {
                    coordinator: self,
                    file_index,
                    page_index,
                    released: false,
                });
            }
            open_for = wait(&gate.opened, open_for);
        }
    }

    /// Marks a file as contributing no pages.
    ///
    /// The active-file counter moves past it immediately when it is the
    /// active file, or later when the counter reaches it.
    pub fn skip_file(&self, file_index: usize) -> Result<()> {
        let mut files = lock(&self.files);
        if file_index < files.active {
            return Err(PzipError::ProtocolViolation(format!(
                "file {file_index} skipped after the active file moved to {}",
                files.active
            )));
        }
        if file_index == files.active {
            let active = files.advance_past(file_index);
            drop(files);
            self.record_file_advance(file_index, active);
            self.file_advanced.notify_all();
        } else {
            files.empty.insert(file_index);
        }
        Ok(())
    }

    /// Wakes every waiter; all pending and later waits fail with `Aborted`.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
        for gate in &self.gates {
            let _guard = lock(&gate.open_for);
            gate.opened.notify_all();
        }
        let _guard = lock(&self.files);
        self.file_advanced.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// True once every file below `file_count` has been merged or skipped.
    pub fn is_complete(&self, file_count: usize) -> bool {
        lock(&self.files).active >= file_count
    }

    fn slot_of(&self, page_index: u64) -> usize {
        (page_index % self.gates.len() as u64) as usize
    }

    fn open_gate(&self, page_index: u64) -> Result<()> {
        let gate = &self.gates[self.slot_of(page_index)];
        let mut open_for = lock(&gate.open_for);
        if let Some(pending) = *open_for {
            return Err(PzipError::ProtocolViolation(format!(
                "turn gate for page {page_index} is still open for page {pending}"
            )));
        }
        *open_for = Some(page_index);
        drop(open_for);
        gate.opened.notify_all();
        Ok(())
    }

    fn finish_file(&self, file_index: usize) -> Result<()> {
        self.open_gate(0)?;

        let mut files = lock(&self.files);
        if files.active != file_index {
            return Err(PzipError::ProtocolViolation(format!(
                "file {file_index} completed while file {} was active",
                files.active
            )));
        }
        let active = files.advance_past(file_index);
        drop(files);
        self.record_file_advance(file_index, active);
        self.file_advanced.notify_all();
        Ok(())
    }

    fn record_file_advance(&self, finished: usize, active: usize) {
        telemetry::increment_counter(
            tags::METRIC_ORDERING_FILE_ADVANCE_COUNT,
            1,
            &[("subsystem", "ordering"), ("op", "file_advance")],
        );
        profile::event(
            tags::PROFILE_ORDERING,
            &PROFILE_TAG_STACK_ORDERING,
            "file_advance",
            "ok",
            0,
            "active file advanced",
        );
        tracing::trace!(finished, active, "active file advanced");
    }
}

/// Permission to merge one page.
///
/// Must be handed back through [`TurnToken::release`] once the page is
/// merged; dropping it unreleased aborts the coordinator, since no later
/// page could ever merge.
#[must_use = "a turn token must be released or the pipeline stalls"]
#[derive(Debug)]
pub struct TurnToken<'a> {
    coordinator: &'a OrderingCoordinator,
    file_index: usize,
    page_index: u64,
    released: bool,
}

impl TurnToken<'_> {
    pub fn file_index(&self) -> usize {
        self.file_index
    }

    pub fn page_index(&self) -> u64 {
        self.page_index
    }

    /// Passes the turn on to the next page in sequence.
    ///
    /// After the last page of a file this opens page 0 of the next
    /// non-empty file.
    pub fn release(mut self, is_last_page: bool) -> Result<()> {
        self.released = true;
        if is_last_page {
            self.coordinator.finish_file(self.file_index)
        } else {
            self.coordinator.open_gate(self.page_index + 1)
        }
    }
}

impl Drop for TurnToken<'_> {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(
                file_index = self.file_index,
                page_index = self.page_index,
                "turn token dropped without release; aborting"
            );
            self.coordinator.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn wait<'a, T>(condvar: &Condvar, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
    match condvar.wait(guard) {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
