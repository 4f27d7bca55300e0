//! Full snapshot archives
//!
//! Writing packages a snapshot record, an all-thread stack dump and a heap
//! image into one zip file. Reading lists and verifies an existing archive.
//!
//! | Entry | Content |
//! |---|---|
//! | `snapshot.json` | the [`Snapshot`](crate::Snapshot) record, pretty JSON |
//! | `stack.txt` | stacks of every thread, plain text |
//! | `heap.bin` | heap image, opaque bytes |

mod reader;
mod writer;

pub use reader::{inspect_archive, read_snapshot, ArchiveSummary, EntrySummary};
pub use writer::Archiver;

use std::path::Path;

use crate::error::Result;

/// Write a full snapshot of the current process to `path` with default
/// settings. See [`Archiver::write_full_snapshot`] for the cost of the heap
/// image and the failure semantics.
pub fn write_full_snapshot(path: impl AsRef<Path>) -> Result<()> {
    Archiver::new().write_full_snapshot(path)
}
