pub mod source;
pub mod splitter;

pub use source::{FileHandle, FileSource, MmapFileSource, ReadFileSource, SourceKind};
pub use splitter::{DEFAULT_PAGE_SIZE, PageSplitter, Pages};
