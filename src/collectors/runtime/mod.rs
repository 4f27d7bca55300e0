//! Runtime introspection
//!
//! The [`RuntimeInspector`] trait is the seam between the snapshot
//! collector/archiver and the process-wide state they read: memory figures,
//! thread counts, stack dumps and heap images. [`ProcessInspector`] is the
//! implementation backed by the operating system; tests substitute fakes that
//! return fixture values.

use std::io::{self, Write};

use crate::collectors::snapshot::models::{GcStats, MemoryStats};
use crate::constants::DEFAULT_MAX_HEAP_DUMP_BYTES;

pub mod allocator;
pub mod common;
pub mod heap_image;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "linux")]
pub mod sampler;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(windows)]
pub mod windows;

/// Process-wide introspection used by snapshots
pub trait RuntimeInspector: Send + Sync {
    /// Memory statistics; lookups that fail leave their fields at zero
    fn memory_stats(&self) -> MemoryStats;

    /// Collection statistics; zero for runtimes without a collector
    fn gc_stats(&self) -> GcStats {
        GcStats::default()
    }

    /// Number of concurrently executing tasks (OS threads)
    fn task_count(&self) -> usize;

    /// Backtrace of the calling thread
    fn current_stack(&self) -> String {
        common::current_thread_backtrace()
    }

    /// Write a human readable dump of every task's stack to `sink`
    fn stack_dump(&self, sink: &mut dyn Write) -> io::Result<()>;

    /// Write a heap image to `sink`, returning the number of heap bytes
    /// copied.
    ///
    /// This walks every heap mapping of the process and may take time and
    /// disk space proportional to its resident heap.
    fn heap_dump(&self, sink: &mut dyn Write) -> io::Result<u64>;
}

/// Inspector for the current process, backed by the operating system
#[derive(Debug, Clone)]
pub struct ProcessInspector {
    max_heap_dump_bytes: u64,
}

impl ProcessInspector {
    pub fn new() -> Self {
        Self {
            max_heap_dump_bytes: DEFAULT_MAX_HEAP_DUMP_BYTES,
        }
    }

    /// Cap the number of heap bytes a dump copies
    pub fn with_heap_limit(max_heap_dump_bytes: u64) -> Self {
        Self { max_heap_dump_bytes }
    }

    pub fn max_heap_dump_bytes(&self) -> u64 {
        self.max_heap_dump_bytes
    }
}

impl Default for ProcessInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeInspector for ProcessInspector {
    fn memory_stats(&self) -> MemoryStats {
        #[cfg(target_os = "linux")]
        let mut stats = linux::memory_stats();

        #[cfg(not(target_os = "linux"))]
        let mut stats = common::sysinfo_memory_stats().unwrap_or_default();

        #[cfg(target_os = "macos")]
        macos::apply_heap_stats(&mut stats);

        #[cfg(windows)]
        windows::apply_heap_stats(&mut stats);

        common::apply_allocator_counters(&mut stats);
        stats
    }

    fn task_count(&self) -> usize {
        #[cfg(target_os = "linux")]
        {
            linux::task_count()
        }

        #[cfg(not(target_os = "linux"))]
        {
            common::sysinfo_task_count()
        }
    }

    fn stack_dump(&self, sink: &mut dyn Write) -> io::Result<()> {
        #[cfg(target_os = "linux")]
        {
            linux::write_thread_dump(sink)
        }

        #[cfg(not(target_os = "linux"))]
        {
            common::write_current_thread_dump(sink)
        }
    }

    fn heap_dump(&self, sink: &mut dyn Write) -> io::Result<u64> {
        #[cfg(target_os = "linux")]
        {
            linux::write_heap_image(sink, self.max_heap_dump_bytes)
        }

        #[cfg(target_os = "macos")]
        {
            macos::write_heap_image(sink, self.max_heap_dump_bytes)
        }

        #[cfg(windows)]
        {
            windows::write_heap_image(sink, self.max_heap_dump_bytes)
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
        {
            let _ = sink;
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "heap dumps are not supported on this platform",
            ))
        }
    }
}
