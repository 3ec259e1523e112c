use serde::{Deserialize, Serialize};

use crate::PzipError;
use crate::types::Result;

/// Width of the length field in each wire record.
///
/// A record is the symbol byte followed by the run length in this many
/// bytes, little-endian when wider than one byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LengthWidth {
    #[default]
    One,
    Two,
    Four,
}

impl LengthWidth {
    /// Parses a width given in bytes.
    pub fn from_bytes(width: usize) -> Result<Self> {
        match width {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            4 => Ok(Self::Four),
            _ => Err(PzipError::InvalidFormat(
                "length field width must be 1, 2 or 4 bytes",
            )),
        }
    }

    /// Length field size in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Four => 4,
        }
    }

    /// Size of one full record, symbol included.
    pub const fn record_size(self) -> usize {
        1 + self.bytes()
    }

    /// Largest run length a single record can carry.
    pub const fn max_run(self) -> u64 {
        match self {
            Self::One => u8::MAX as u64,
            Self::Two => u16::MAX as u64,
            Self::Four => u32::MAX as u64,
        }
    }

    /// Number of records a run of `length` is split into.
    pub fn records_for(self, length: u64) -> u64 {
        length.div_ceil(self.max_run())
    }
}

/// Wire record layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFormat {
    pub length_width: LengthWidth,
}

impl RecordFormat {
    pub fn new(length_width: LengthWidth) -> Self {
        Self { length_width }
    }

    pub fn max_run(&self) -> u64 {
        self.length_width.max_run()
    }

    pub fn record_size(&self) -> usize {
        self.length_width.record_size()
    }
}
