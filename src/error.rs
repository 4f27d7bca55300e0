//! Errors surfaced by the full snapshot archive operation.
//!
//! Collection itself never fails; only writing the archive does. Each error
//! carries the stage that failed and the underlying cause.

use std::fmt;
use std::io;

use thiserror::Error;

pub type Result<T, E = SnapshotError> = std::result::Result<T, E>;

/// Boxed cause of a stage failure (io, zip or serde errors)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Stage of a full snapshot at which an error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Open,
    Snapshot,
    Trace,
    Dump,
    Finalize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Open => write!(f, "open"),
            Stage::Snapshot => write!(f, "snapshot"),
            Stage::Trace => write!(f, "trace"),
            Stage::Dump => write!(f, "dump"),
            Stage::Finalize => write!(f, "finalize"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The target file could not be created or truncated
    #[error("open: {0}")]
    Open(#[source] io::Error),

    /// The `snapshot.json` entry could not be created or serialized
    #[error("snapshot: {0}")]
    SnapshotWrite(#[source] BoxError),

    /// The `stack.txt` entry could not be created or the threads not dumped
    #[error("trace: {0}")]
    TraceWrite(#[source] BoxError),

    /// The temp file, the heap dump or the `heap.bin` copy failed
    #[error("dump: {0}")]
    DumpWrite(#[source] BoxError),

    /// The zip central directory could not be written or flushed
    #[error("finalize: {0}")]
    Finalize(#[source] BoxError),
}

impl SnapshotError {
    pub fn stage(&self) -> Stage {
        match self {
            SnapshotError::Open(_) => Stage::Open,
            SnapshotError::SnapshotWrite(_) => Stage::Snapshot,
            SnapshotError::TraceWrite(_) => Stage::Trace,
            SnapshotError::DumpWrite(_) => Stage::Dump,
            SnapshotError::Finalize(_) => Stage::Finalize,
        }
    }

    pub(crate) fn snapshot(err: impl Into<BoxError>) -> Self {
        SnapshotError::SnapshotWrite(err.into())
    }

    pub(crate) fn trace(err: impl Into<BoxError>) -> Self {
        SnapshotError::TraceWrite(err.into())
    }

    pub(crate) fn dump(err: impl Into<BoxError>) -> Self {
        SnapshotError::DumpWrite(err.into())
    }

    pub(crate) fn finalize(err: impl Into<BoxError>) -> Self {
        SnapshotError::Finalize(err.into())
    }
}
