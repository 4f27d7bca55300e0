//! # proc-snapshot
//!
//! Point-in-time diagnostic snapshots of the running process.
//!
//! ## Overview
//!
//! A snapshot records memory statistics, the stack of the calling thread,
//! build metadata, the thread count and process identity (pid, uid, gid,
//! environment, executable, working directory, hostname). A full snapshot
//! packages that record together with a dump of every thread's stack and a
//! heap image into one zip archive for offline analysis.
//!
//! ## Usage
//!
//! ### Collecting a snapshot
//!
//! ```no_run
//! let snapshot = proc_snapshot::collect();
//! println!("pid {} has {} threads", snapshot.pid, snapshot.num_tasks);
//! ```
//!
//! ### Writing a full snapshot
//!
//! ```no_run
//! use proc_snapshot::{Stage, write_full_snapshot};
//!
//! match write_full_snapshot("/var/tmp/service.zip") {
//!     Ok(()) => {}
//!     Err(e) if e.stage() == Stage::Open => eprintln!("cannot create archive: {}", e),
//!     Err(e) => eprintln!("archive incomplete: {}", e),
//! }
//! ```
//!
//! Register build metadata once at startup so snapshots can name the
//! binary:
//!
//! ```no_run
//! proc_snapshot::build_info::register(proc_snapshot::build_info!());
//! ```
//!
//! Installing [`TrackingAllocator`] as the global allocator adds live
//! allocation counters to the memory statistics.
//!
//! ## Module Organization
//!
//! - [`collectors`]: runtime inspection, OS lookups and the snapshot collector
//! - [`archive`]: writing and inspecting full snapshot archives
//! - [`config`]: YAML configuration
//! - [`error`]: the archive error type
//! - [`security`]: environment credential scrubbing
//! - [`build_info`]: build metadata registration
//! - [`cli`]: command-line interface definitions
//! - [`constants`]: application-wide constants
//!
//! ## Safety
//!
//! `unsafe` is limited to the global allocator wrapper, the uid/gid system
//! calls and the platform memory APIs. Heap images are read through
//! `/proc/self/mem` on Linux, `mach_vm_read_overwrite` on macOS and
//! `ReadProcessMemory` on Windows. On Linux, other threads' stacks are
//! sampled from a `SIGURG` handler that is installed only while a stack dump
//! runs.

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Process state collection
pub mod collectors;

/// Full snapshot archives
pub mod archive;

/// Utility functions for hashing
pub mod utils;

/// Configuration management
pub mod config;

/// Build metadata registration
pub mod build_info;

/// Application constants and configuration values
pub mod constants;

/// Errors of the full snapshot operation
pub mod error;

/// Credential protection for collected environments
pub mod security;

/// Test utilities and helpers
#[cfg(test)]
pub mod test_utils;

pub use archive::{inspect_archive, read_snapshot, write_full_snapshot, ArchiveSummary, Archiver, EntrySummary};
pub use collectors::runtime::allocator::TrackingAllocator;
pub use collectors::runtime::{ProcessInspector, RuntimeInspector};
pub use collectors::snapshot::models::{BuildInfo, Collection, FieldDiagnostic, GcStats, MemoryStats, Module, Snapshot};
pub use collectors::snapshot::{collect, Collector};
pub use collectors::system::{OsSource, SystemSource};
pub use config::SnapshotConfig;
pub use error::{SnapshotError, Stage};
