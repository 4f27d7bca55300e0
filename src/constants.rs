//! Global constants for the proc-snapshot crate.
//!
//! This module centralizes hardcoded values: archive entry names, buffer
//! sizes and configuration defaults.

// Archive layout
/// Entry holding the serialized snapshot record
pub const SNAPSHOT_ENTRY: &str = "snapshot.json";

/// Entry holding the all-thread stack dump
pub const STACK_ENTRY: &str = "stack.txt";

/// Entry holding the raw heap image
pub const HEAP_ENTRY: &str = "heap.bin";

/// Entries written by a full snapshot, in creation order
pub const ARCHIVE_ENTRIES: [&str; 3] = [SNAPSHOT_ENTRY, STACK_ENTRY, HEAP_ENTRY];

/// Prefix for the temporary heap dump file
pub const HEAP_DUMP_TEMP_PREFIX: &str = "dump";

/// Permissions of the archive file and its entries on unix
pub const ARCHIVE_FILE_MODE: u32 = 0o600;

// Buffer size constants
/// Chunk size for reading heap mappings (1MB)
pub const MEMORY_CHUNK_SIZE: usize = 1024 * 1024;

/// Buffer size for hashing archive entries (1MB)
pub const HASH_BUFFER_SIZE: usize = 1024 * 1024;

// Configuration defaults
/// Default deflate level for archive entries
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 6;

/// Highest deflate level accepted by the zip writer
pub const MAX_COMPRESSION_LEVEL: i32 = 9;

/// Default cap on the heap image size (16GB)
pub const DEFAULT_MAX_HEAP_DUMP_BYTES: u64 = 16 * 1024 * 1024 * 1024;

/// Placeholder written in place of a redacted environment value
pub const REDACTED_VALUE: &str = "<REDACTED>";

// Heap image framing
/// First line of a heap image written by the process inspector
pub const HEAP_DUMP_MAGIC: &str = "PROCSNAP-HEAP";

/// Version of the heap image framing
pub const HEAP_DUMP_VERSION: u32 = 2;

/// Largest inaccessible mapping treated as a thread stack guard (64KB)
pub const THREAD_GUARD_MAX_BYTES: u64 = 64 * 1024;

// Stack sampling
/// Deepest stack recorded per thread
pub const MAX_STACK_FRAMES: usize = 128;

/// Time a thread gets to answer the sampling signal
pub const STACK_SAMPLE_TIMEOUT_MS: u64 = 250;

/// Signal used to sample other threads' stacks; ignored by default
#[cfg(target_os = "linux")]
pub const STACK_SAMPLE_SIGNAL: libc::c_int = libc::SIGURG;

// Procfs locations
/// Per-process status file
pub const PROC_SELF_STATUS: &str = "/proc/self/status";

/// Per-process memory map listing
pub const PROC_SELF_MAPS: &str = "/proc/self/maps";

/// Per-process memory file
pub const PROC_SELF_MEM: &str = "/proc/self/mem";

/// Directory holding one entry per thread
pub const PROC_SELF_TASKS: &str = "/proc/self/task";
