//! Wire format of the encoded stream.
//!
//! The output is a flat sequence of `(symbol, length)` records with no
//! header, framing or terminator. The length field is 1, 2 or 4 bytes wide.

pub mod reader;
pub mod record;
pub mod writer;

pub use reader::{RecordReader, decode_records, expand_records};
pub use record::{LengthWidth, RecordFormat};
pub use writer::{RecordWriter, RunSink, SinkSummary};
