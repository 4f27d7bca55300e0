//! Data models for process snapshots
//!
//! The snapshot record and the statistics structures nested in it. Field
//! names serialize in camelCase so `snapshot.json` stays stable for tooling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Memory statistics of the process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryStats {
    /// Resident set size in bytes
    pub resident_bytes: u64,
    /// Virtual memory size in bytes
    pub virtual_bytes: u64,
    /// Peak resident set size in bytes
    pub peak_resident_bytes: u64,
    /// Peak virtual memory size in bytes
    pub peak_virtual_bytes: u64,
    /// Size of the data segment in bytes
    pub data_bytes: u64,
    /// Size of the main thread stack in bytes
    pub stack_bytes: u64,
    /// Swapped out memory in bytes
    pub swap_bytes: u64,
    /// Total size of heap mappings in bytes
    pub heap_bytes: u64,
    /// Number of heap mappings
    pub heap_regions: u64,
    /// Whether the allocator counters below come from a tracking allocator
    pub allocator_tracked: bool,
    /// Bytes currently allocated through the global allocator
    pub allocated_bytes: u64,
    /// Bytes allocated since start, including freed ones
    pub total_allocated_bytes: u64,
    /// Highest value `allocated_bytes` has reached
    pub peak_allocated_bytes: u64,
    /// Number of allocations since start
    pub allocations: u64,
    /// Number of deallocations since start
    pub deallocations: u64,
}

/// Garbage collection statistics
///
/// Zero for processes without a tracing collector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GcStats {
    /// Number of completed collections
    pub num_gc: u64,
    /// Total time spent paused for collection, in nanoseconds
    pub pause_total_ns: u64,
    /// Recent pause durations in nanoseconds, most recent first
    pub pauses_ns: Vec<u64>,
    /// End time of the last collection
    pub last_gc: Option<DateTime<Utc>>,
}

/// A dependency of the main package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Module {
    pub path: String,
    pub version: String,
}

/// Build metadata of the running binary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildInfo {
    /// Main package name
    pub path: String,
    /// Main package version
    pub version: String,
    /// Output of `rustc --version` at build time
    pub rust_version: String,
    /// Target triple
    pub target: String,
    /// Cargo profile (`debug` or `release`)
    pub profile: String,
    /// Dependencies registered by the host
    pub deps: Vec<Module>,
}

/// Point-in-time snapshot of the running process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub memory: MemoryStats,
    pub gc: GcStats,
    /// Backtrace of the collecting thread
    pub stack: String,
    pub build_info: BuildInfo,
    /// Number of OS threads in the process
    pub num_tasks: usize,
    pub pid: u32,
    pub uid: u32,
    pub gid: u32,
    /// Environment as `KEY=VALUE` strings
    pub environ: Vec<String>,
    pub executable: String,
    pub wd: String,
    pub hostname: String,
    pub collected_at: DateTime<Utc>,
}

/// A field that fell back to its zero value during collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDiagnostic {
    /// JSON name of the field
    pub field: &'static str,
    /// Why the lookup failed
    pub error: String,
}

/// Snapshot together with the lookups that degraded
#[derive(Debug, Clone)]
pub struct Collection {
    pub snapshot: Snapshot,
    pub diagnostics: Vec<FieldDiagnostic>,
}
