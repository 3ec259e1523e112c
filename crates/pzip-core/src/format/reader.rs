use std::io::{ErrorKind, Read};

use crate::PzipError;
use crate::types::{Result, Run};

use super::{LengthWidth, RecordFormat};

/// Iterates wire records from a reader.
///
/// Each item is one record as a [`Run`]; split runs come back as several
/// records of the same symbol.
#[derive(Debug)]
pub struct RecordReader<R: Read> {
    reader: R,
    format: RecordFormat,
    records_read: u64,
    done: bool,
}

impl<R: Read> RecordReader<R> {
    pub fn new(reader: R, format: RecordFormat) -> Self {
        Self {
            reader,
            format,
            records_read: 0,
            done: false,
        }
    }

    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn read_record(&mut self) -> Result<Option<Run>> {
        let mut record = [0u8; 5];
        let size = self.format.record_size();
        let filled = read_full(&mut self.reader, &mut record[..size])?;
        if filled == 0 {
            return Ok(None);
        }
        if filled < size {
            return Err(PzipError::InvalidFormat("truncated record"));
        }

        let length = match self.format.length_width {
            LengthWidth::One => u64::from(record[1]),
            LengthWidth::Two => u64::from(u16::from_le_bytes([record[1], record[2]])),
            LengthWidth::Four => u64::from(u32::from_le_bytes([
                record[1], record[2], record[3], record[4],
            ])),
        };
        if length == 0 {
            return Err(PzipError::InvalidFormat("zero-length record"));
        }

        self.records_read += 1;
        Ok(Some(Run::new(record[0], length)))
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Run>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(run)) => Some(Ok(run)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(error) if error.kind() == ErrorKind::Interrupted => continue,
            Err(error) => return Err(error.into()),
        }
    }
    Ok(filled)
}

/// Decodes an encoded buffer into its records.
pub fn decode_records(encoded: &[u8], format: RecordFormat) -> Result<Vec<Run>> {
    if encoded.len() % format.record_size() != 0 {
        return Err(PzipError::InvalidFormat("truncated record"));
    }
    let mut runs = Vec::new();
    runs.try_reserve(encoded.len() / format.record_size())?;
    for run in RecordReader::new(encoded, format) {
        runs.push(run?);
    }
    Ok(runs)
}

/// Reconstructs the original bytes from an encoded buffer.
pub fn expand_records(encoded: &[u8], format: RecordFormat) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for run in RecordReader::new(encoded, format) {
        let run = run?;
        let length = usize::try_from(run.length)
            .map_err(|_| PzipError::InvalidFormat("run length exceeds usize range"))?;
        out.try_reserve(length)?;
        out.resize(out.len() + length, run.symbol);
    }
    Ok(out)
}
