use crate::types::{Result, Run};

/// Run-length encodes one page.
///
/// The runs cover `data` exactly, adjacent runs never share a symbol, and an
/// empty slice yields no runs.
pub fn compress_page(data: &[u8]) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut rest = data;
    while let Some((symbol, length)) = leading_run(rest) {
        runs.push(Run::new(symbol, length as u64));
        rest = &rest[length..];
    }
    runs
}

/// Same as [`compress_page`], appending into a caller-provided buffer.
///
/// The buffer is cleared first. Growth goes through `try_reserve`, so an
/// exhausted allocator surfaces as [`PzipError::Allocation`](crate::PzipError::Allocation).
pub fn compress_page_into(data: &[u8], runs: &mut Vec<Run>) -> Result<()> {
    runs.clear();
    let mut rest = data;
    while let Some((symbol, length)) = leading_run(rest) {
        if runs.len() == runs.capacity() {
            runs.try_reserve(runs.capacity().max(16))?;
        }
        runs.push(Run::new(symbol, length as u64));
        rest = &rest[length..];
    }
    Ok(())
}

/// Symbol and length of the run starting at `data[0]`.
#[inline]
fn leading_run(data: &[u8]) -> Option<(u8, usize)> {
    let (&symbol, tail) = data.split_first()?;
    let length = 1 + tail.iter().position(|&byte| byte != symbol).unwrap_or(tail.len());
    Some((symbol, length))
}

/// Streaming single-threaded encoder for one file.
///
/// Chunks fed through [`SequentialEncoder::update`] are encoded as if they
/// were one contiguous slice; the pending run is only emitted once a
/// different byte or [`SequentialEncoder::finish`] closes it.
#[derive(Debug, Default)]
pub struct SequentialEncoder {
    pending: Option<Run>,
}

impl SequentialEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes `chunk`, passing every completed run to `emit`.
    pub fn update<E>(
        &mut self,
        chunk: &[u8],
        mut emit: impl FnMut(Run) -> std::result::Result<(), E>,
    ) -> std::result::Result<(), E> {
        let mut rest = chunk;
        while let Some((symbol, length)) = leading_run(rest) {
            rest = &rest[length..];

            match self.pending.as_mut() {
                Some(run) if run.symbol == symbol => run.length += length as u64,
                _ => {
                    if let Some(done) = self.pending.replace(Run::new(symbol, length as u64)) {
                        emit(done)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Closes the pending run, if any.
    pub fn finish(self) -> Option<Run> {
        self.pending
    }
}

/// Encodes a whole buffer with the streaming encoder.
pub fn encode_sequential(data: &[u8]) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut encoder = SequentialEncoder::new();
    let _ = encoder.update::<std::convert::Infallible>(data, |run| {
        runs.push(run);
        Ok(())
    });
    runs.extend(encoder.finish());
    runs
}
