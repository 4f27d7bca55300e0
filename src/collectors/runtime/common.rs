//! Platform-independent runtime helpers
//!
//! Fallbacks built on `sysinfo` and `std::backtrace` for platforms without a
//! dedicated implementation, plus pieces shared by all inspectors.

use std::backtrace::Backtrace;
use std::io::{self, Write};
use std::thread;

use chrono::Utc;
use log::debug;
use sysinfo::{Pid, PidExt, ProcessExt, ProcessRefreshKind, System, SystemExt};

use crate::collectors::runtime::allocator::allocator_counters;
use crate::collectors::snapshot::models::MemoryStats;

/// Symbolized backtrace of the calling thread, regardless of `RUST_BACKTRACE`
pub fn current_thread_backtrace() -> String {
    Backtrace::force_capture().to_string()
}

/// Copy tracking allocator counters into `stats` when the allocator is
/// installed
pub fn apply_allocator_counters(stats: &mut MemoryStats) {
    match allocator_counters() {
        Some(counters) => {
            stats.allocator_tracked = true;
            stats.allocated_bytes = counters.allocated_bytes;
            stats.total_allocated_bytes = counters.total_allocated_bytes;
            stats.peak_allocated_bytes = counters.peak_allocated_bytes;
            stats.allocations = counters.allocations;
            stats.deallocations = counters.deallocations;
        }
        None => {
            stats.allocator_tracked = false;
        }
    }
}

/// Resident and virtual sizes of the current process from `sysinfo`
pub fn sysinfo_memory_stats() -> Option<MemoryStats> {
    let pid = Pid::from_u32(std::process::id());
    let mut system = System::new();

    if !system.refresh_process_specifics(pid, ProcessRefreshKind::new()) {
        debug!("sysinfo could not refresh process {}", pid);
        return None;
    }

    system.process(pid).map(|process| MemoryStats {
        resident_bytes: process.memory(),
        virtual_bytes: process.virtual_memory(),
        ..Default::default()
    })
}

/// Thread count on platforms without a per-thread listing: the calling
/// thread when the process is visible, zero otherwise
pub fn sysinfo_task_count() -> usize {
    let pid = Pid::from_u32(std::process::id());
    let mut system = System::new();

    if system.refresh_process_specifics(pid, ProcessRefreshKind::new()) {
        1
    } else {
        0
    }
}

/// Stack dump limited to the calling thread
pub fn write_current_thread_dump(sink: &mut dyn Write) -> io::Result<()> {
    writeln!(
        sink,
        "thread dump pid={} at {}",
        std::process::id(),
        Utc::now().to_rfc3339()
    )?;
    writeln!(sink, "other threads cannot be inspected on this platform")?;
    writeln!(sink)?;
    write_current_thread_section(sink, None)
}

/// Backtrace section for the calling thread
pub fn write_current_thread_section(sink: &mut dyn Write, tid: Option<i64>) -> io::Result<()> {
    let current = thread::current();
    let name = current.name().unwrap_or("<unnamed>");

    match tid {
        Some(tid) => writeln!(sink, "current thread {} \"{}\" backtrace:", tid, name)?,
        None => writeln!(sink, "current thread \"{}\" backtrace:", name)?,
    }
    writeln!(sink, "{}", current_thread_backtrace())?;
    Ok(())
}
