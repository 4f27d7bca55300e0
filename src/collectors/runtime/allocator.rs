//! Counting global allocator
//!
//! Wraps the system allocator and keeps running totals so snapshots can
//! report allocator level figures. Hosts opt in with:
//!
//! ```no_run
//! use proc_snapshot::TrackingAllocator;
//!
//! #[global_allocator]
//! static ALLOC: TrackingAllocator = TrackingAllocator::new();
//! ```

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

static INSTALLED: AtomicBool = AtomicBool::new(false);
static ALLOCATED: AtomicU64 = AtomicU64::new(0);
static TOTAL_ALLOCATED: AtomicU64 = AtomicU64::new(0);
static PEAK_ALLOCATED: AtomicU64 = AtomicU64::new(0);
static ALLOCATIONS: AtomicU64 = AtomicU64::new(0);
static DEALLOCATIONS: AtomicU64 = AtomicU64::new(0);

/// Global allocator that counts allocations made through it
pub struct TrackingAllocator {
    inner: System,
}

impl TrackingAllocator {
    pub const fn new() -> Self {
        Self { inner: System }
    }
}

impl Default for TrackingAllocator {
    fn default() -> Self {
        Self::new()
    }
}

fn record_alloc(size: u64) {
    INSTALLED.store(true, Ordering::Relaxed);
    ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
    TOTAL_ALLOCATED.fetch_add(size, Ordering::Relaxed);
    let current = ALLOCATED.fetch_add(size, Ordering::Relaxed) + size;
    PEAK_ALLOCATED.fetch_max(current, Ordering::Relaxed);
}

fn record_dealloc(size: u64) {
    DEALLOCATIONS.fetch_add(1, Ordering::Relaxed);
    ALLOCATED.fetch_sub(size, Ordering::Relaxed);
}

// SAFETY: every call is forwarded unchanged to `System`; only counters are
// touched around it and they never allocate.
unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc(layout);
        if !ptr.is_null() {
            record_alloc(layout.size() as u64);
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc_zeroed(layout);
        if !ptr.is_null() {
            record_alloc(layout.size() as u64);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.inner.dealloc(ptr, layout);
        record_dealloc(layout.size() as u64);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = self.inner.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            record_dealloc(layout.size() as u64);
            record_alloc(new_size as u64);
        }
        new_ptr
    }
}

/// Counters reported by the tracking allocator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorCounters {
    pub allocated_bytes: u64,
    pub total_allocated_bytes: u64,
    pub peak_allocated_bytes: u64,
    pub allocations: u64,
    pub deallocations: u64,
}

/// Current allocator counters, or `None` when no `TrackingAllocator` is the
/// global allocator
pub fn allocator_counters() -> Option<AllocatorCounters> {
    if !INSTALLED.load(Ordering::Relaxed) {
        return None;
    }

    Some(AllocatorCounters {
        allocated_bytes: ALLOCATED.load(Ordering::Relaxed),
        total_allocated_bytes: TOTAL_ALLOCATED.load(Ordering::Relaxed),
        peak_allocated_bytes: PEAK_ALLOCATED.load(Ordering::Relaxed),
        allocations: ALLOCATIONS.load(Ordering::Relaxed),
        deallocations: DEALLOCATIONS.load(Ordering::Relaxed),
    })
}
