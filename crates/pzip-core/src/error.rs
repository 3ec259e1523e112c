use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PzipError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot access '{}': {source}", .path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("allocation failed: {0}")]
    Allocation(String),
    #[error("ordering protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("pipeline aborted")]
    Aborted,
    #[error("invalid format: {0}")]
    InvalidFormat(&'static str),
    #[error("worker error: {0}")]
    Worker(String),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<PzipError>,
    },
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl PzipError {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn file_access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileAccess {
            path: path.into(),
            source,
        }
    }

    /// True for errors a [`FileErrorPolicy::Skip`](crate::FileErrorPolicy::Skip) run may step over.
    pub fn is_file_access(&self) -> bool {
        match self {
            Self::FileAccess { .. } => true,
            Self::Context { source, .. } => source.is_file_access(),
            _ => false,
        }
    }
}

impl From<std::collections::TryReserveError> for PzipError {
    fn from(error: std::collections::TryReserveError) -> Self {
        Self::Allocation(error.to_string())
    }
}
