use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::telemetry::{self, tags};
use crate::types::{PageResult, Result, Run};

#[derive(Debug, Default)]
struct SequenceState {
    runs: VecDeque<Run>,
    /// Absolute index of `runs[0]`.
    base: u64,
    /// The last run may still grow from the next page of its file.
    open_tail: bool,
    tail_file: Option<usize>,
    pages: u64,
    total_runs: u64,
    boundary_merges: u64,
    peak_buffered: usize,
    #[cfg(test)]
    reserve_limit: Option<usize>,
}

impl SequenceState {
    fn sealed_end(&self) -> u64 {
        self.base + self.runs.len() as u64 - u64::from(self.open_tail)
    }

    fn reserve(&mut self, additional: usize) -> Result<()> {
        #[cfg(test)]
        if self
            .reserve_limit
            .is_some_and(|limit| self.runs.len() + additional > limit)
        {
            return Err(crate::PzipError::Allocation(
                "run sequence limit reached".to_string(),
            ));
        }
        self.runs.try_reserve(additional)?;
        Ok(())
    }
}

/// Outcome of one [`ResultSequence::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// New runs pushed onto the sequence.
    pub runs_added: usize,
    /// Whether the page's first run extended the previous tail.
    pub boundary_merged: bool,
}

/// The single ordered run stream all pages merge into.
///
/// Pages must be appended in `(file, page)` order; the ordering coordinator
/// guarantees that. Runs are addressed by absolute position so the
/// collector can read with a cursor while appends continue, then discard
/// what it has streamed.
#[derive(Debug)]
pub struct ResultSequence {
    state: Mutex<SequenceState>,
    doorbell_tx: Sender<()>,
    doorbell_rx: Receiver<()>,
}

impl Default for ResultSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultSequence {
    pub fn new() -> Self {
        let (doorbell_tx, doorbell_rx) = bounded(1);
        Self {
            state: Mutex::new(SequenceState::default()),
            doorbell_tx,
            doorbell_rx,
        }
    }

    /// Appends a page's runs, merging across the page boundary when the
    /// open tail has the same symbol and belongs to the same file.
    ///
    /// The page's run buffer is released back to its pool afterwards. On
    /// error the sequence is left exactly as it was.
    pub fn append(&self, page: PageResult) -> Result<AppendOutcome> {
        let runs = page.runs();
        let mut state = self.lock();

        let tail_open = state.open_tail && state.tail_file == Some(page.file_index);
        let boundary_merged = tail_open
            && matches!(
                (state.runs.back(), runs.first()),
                (Some(tail), Some(first)) if tail.symbol == first.symbol
            );
        let rest = if boundary_merged { &runs[1..] } else { runs };
        let runs_added = rest.len();

        state.reserve(runs_added)?;
        if boundary_merged {
            if let (Some(tail), Some(first)) = (state.runs.back_mut(), runs.first()) {
                tail.length += first.length;
            }
        }
        state.runs.extend(rest.iter().copied());
        if !runs.is_empty() {
            state.tail_file = Some(page.file_index);
            state.open_tail = !page.is_last_page;
        } else if page.is_last_page && state.tail_file == Some(page.file_index) {
            state.open_tail = false;
        }

        state.pages += 1;
        state.total_runs += runs_added as u64;
        if boundary_merged {
            state.boundary_merges += 1;
        }
        state.peak_buffered = state.peak_buffered.max(state.runs.len());
        drop(state);
        drop(page);

        let labels = [("subsystem", "ordering"), ("op", "merge")];
        telemetry::increment_counter(tags::METRIC_ORDERING_MERGE_COUNT, 1, &labels);
        if boundary_merged {
            telemetry::increment_counter(tags::METRIC_ORDERING_BOUNDARY_MERGE_COUNT, 1, &labels);
        }
        self.ring();

        Ok(AppendOutcome {
            runs_added,
            boundary_merged,
        })
    }

    /// Copies every sealed run at or after `cursor`.
    ///
    /// Returns the runs and the cursor to pass next time. Nothing is removed.
    pub fn read_since(&self, cursor: u64) -> (Vec<Run>, u64) {
        let state = self.lock();
        let end = state.sealed_end();
        let start = cursor.max(state.base);
        if start >= end {
            return (Vec::new(), cursor.max(end));
        }

        let from = (start - state.base) as usize;
        let to = (end - state.base) as usize;
        let runs = state.runs.range(from..to).copied().collect();
        (runs, end)
    }

    /// Drops sealed runs before `cursor`.
    pub fn discard_before(&self, cursor: u64) {
        let mut state = self.lock();
        let limit = cursor.min(state.sealed_end());
        while state.base < limit {
            if state.runs.pop_front().is_none() {
                break;
            }
            state.base += 1;
        }
    }

    /// Closes the tail so the final run can be read.
    pub fn seal(&self) {
        self.lock().open_tail = false;
        self.ring();
    }

    /// Wakes the collector.
    pub fn ring(&self) {
        let _ = self.doorbell_tx.try_send(());
    }

    /// Waits up to `timeout` for an append; returns true if one happened.
    pub fn wait_doorbell(&self, timeout: Duration) -> bool {
        self.doorbell_rx.recv_timeout(timeout).is_ok()
    }

    /// Runs currently held in memory.
    pub fn buffered_len(&self) -> usize {
        self.lock().runs.len()
    }

    pub fn peak_buffered(&self) -> usize {
        self.lock().peak_buffered
    }

    /// Pages appended so far.
    pub fn pages(&self) -> u64 {
        self.lock().pages
    }

    /// Runs ever appended, after boundary merging.
    pub fn total_runs(&self) -> u64 {
        self.lock().total_runs
    }

    pub fn boundary_merges(&self) -> u64 {
        self.lock().boundary_merges
    }

    fn lock(&self) -> MutexGuard<'_, SequenceState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::compress_page;

    fn page(file: usize, index: u64, last: bool, data: &[u8]) -> PageResult {
        PageResult::from_runs(file, index, last, compress_page(data))
    }

    #[test]
    fn open_tail_is_held_back() -> Result<()> {
        let sequence = ResultSequence::new();
        sequence.append(page(0, 0, false, b"aaab"))?;

        let (runs, cursor) = sequence.read_since(0);
        assert_eq!(runs, vec![Run::new(b'a', 3)]);
        assert_eq!(cursor, 1);

        let outcome = sequence.append(page(0, 1, true, b"bbc"))?;
        assert!(outcome.boundary_merged);
        let (runs, cursor) = sequence.read_since(cursor);
        assert_eq!(runs, vec![Run::new(b'b', 3), Run::new(b'c', 1)]);
        assert_eq!(cursor, 3);
        Ok(())
    }

    #[test]
    fn never_merges_across_files() -> Result<()> {
        let sequence = ResultSequence::new();
        sequence.append(page(0, 0, true, b"aa"))?;
        let outcome = sequence.append(page(1, 0, true, b"aa"))?;
        assert!(!outcome.boundary_merged);
        assert_eq!(
            sequence.read_since(0).0,
            vec![Run::new(b'a', 2), Run::new(b'a', 2)]
        );
        Ok(())
    }

    #[test]
    fn failed_append_leaves_tail_untouched() -> Result<()> {
        let sequence = ResultSequence::new();
        sequence.append(page(0, 0, false, b"aaab"))?;
        sequence.lock().reserve_limit = Some(2);

        let failed = sequence.append(page(0, 1, false, b"bbcc"));
        assert!(matches!(failed, Err(crate::PzipError::Allocation(_))));
        assert_eq!(sequence.pages(), 1);
        assert_eq!(sequence.boundary_merges(), 0);

        sequence.lock().reserve_limit = None;
        sequence.append(page(0, 1, true, b"bbcc"))?;
        assert_eq!(
            sequence.read_since(0).0,
            vec![Run::new(b'a', 3), Run::new(b'b', 3), Run::new(b'c', 2)]
        );
        Ok(())
    }

    #[test]
    fn discard_keeps_unread_runs() -> Result<()> {
        let sequence = ResultSequence::new();
        sequence.append(page(0, 0, false, b"abc"))?;
        let (_, cursor) = sequence.read_since(0);
        sequence.discard_before(cursor);
        assert_eq!(sequence.buffered_len(), 1);

        sequence.seal();
        let (runs, cursor) = sequence.read_since(cursor);
        assert_eq!(runs, vec![Run::new(b'c', 1)]);
        sequence.discard_before(cursor);
        assert_eq!(sequence.buffered_len(), 0);
        Ok(())
    }
}
