//! Windows-specific runtime introspection
//!
//! Heap regions are the committed private read/write regions found by
//! walking the address space with `VirtualQuery`. Thread stacks are the
//! reservations that carry a guard page and are left out.

use std::io::{self, Write};
use std::mem;

use log::debug;
use winapi::shared::basetsd::SIZE_T;
use winapi::shared::minwindef::LPVOID;
use winapi::um::memoryapi::{ReadProcessMemory, VirtualQuery};
use winapi::um::processthreadsapi::GetCurrentProcess;
use winapi::um::sysinfoapi::{GetSystemInfo, SYSTEM_INFO};
use winapi::um::winnt::{MEMORY_BASIC_INFORMATION, MEM_COMMIT, MEM_PRIVATE, PAGE_GUARD, PAGE_READWRITE};

use crate::collectors::runtime::heap_image::{self, HeapRegion, RegionMemory};
use crate::collectors::snapshot::models::MemoryStats;

/// One region reported by `VirtualQuery`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRegion {
    pub start: u64,
    pub end: u64,
    pub allocation_base: u64,
    pub state: u32,
    pub protect: u32,
    pub kind: u32,
}

impl QueryRegion {
    fn is_private_rw(&self) -> bool {
        self.state == MEM_COMMIT
            && self.kind == MEM_PRIVATE
            && self.protect & PAGE_GUARD == 0
            && self.protect & 0xff == PAGE_READWRITE
    }

    fn to_region(&self) -> HeapRegion {
        HeapRegion {
            start: self.start,
            end: self.end,
            perms: "rw-p".to_string(),
            offset: 0,
            name: String::new(),
        }
    }
}

/// Select heap regions from an address-ordered walk. Regions sharing an
/// allocation with a guard page, or holding `stack_pointer`, are stacks.
pub fn heap_regions_from(walk: &[QueryRegion], stack_pointer: u64) -> Vec<HeapRegion> {
    let stack_bases: Vec<u64> = walk
        .iter()
        .filter(|r| r.protect & PAGE_GUARD != 0 || (r.start <= stack_pointer && stack_pointer < r.end))
        .map(|r| r.allocation_base)
        .collect();

    walk.iter()
        .filter(|r| r.is_private_rw() && !stack_bases.contains(&r.allocation_base))
        .map(QueryRegion::to_region)
        .collect()
}

fn system_info() -> SYSTEM_INFO {
    // SAFETY: GetSystemInfo fills the whole struct
    unsafe {
        let mut info: SYSTEM_INFO = mem::zeroed();
        GetSystemInfo(&mut info);
        info
    }
}

/// Walk the address space of the current process
pub fn query_regions() -> Vec<QueryRegion> {
    let info = system_info();
    let mut address = info.lpMinimumApplicationAddress as u64;
    let max = info.lpMaximumApplicationAddress as u64;
    let mut regions = Vec::new();

    while address < max {
        let mut mbi: MEMORY_BASIC_INFORMATION = unsafe { mem::zeroed() };

        // SAFETY: mbi is a valid out buffer of the length passed
        let written = unsafe {
            VirtualQuery(
                address as usize as LPVOID,
                &mut mbi,
                mem::size_of::<MEMORY_BASIC_INFORMATION>() as SIZE_T,
            )
        };
        if written == 0 || mbi.RegionSize == 0 {
            break;
        }

        let start = mbi.BaseAddress as u64;
        let end = start + mbi.RegionSize as u64;
        regions.push(QueryRegion {
            start,
            end,
            allocation_base: mbi.AllocationBase as u64,
            state: mbi.State,
            protect: mbi.Protect,
            kind: mbi.Type,
        });

        address = end;
    }

    debug!("VirtualQuery walked {} regions", regions.len());
    regions
}

/// Heap regions of the current process
pub fn heap_regions() -> Vec<HeapRegion> {
    let here = 0u8;
    heap_regions_from(&query_regions(), &here as *const u8 as u64)
}

/// Memory of the current process. Committed private pages count as
/// resident; the working set is not queried page by page.
pub struct CurrentProcessMemory {
    page_size: u64,
}

impl CurrentProcessMemory {
    pub fn new() -> Self {
        Self {
            page_size: system_info().dwPageSize as u64,
        }
    }
}

impl RegionMemory for CurrentProcessMemory {
    fn page_size(&self) -> u64 {
        self.page_size
    }

    fn residency(&self, _start: u64, len: u64, pages: &mut Vec<bool>) -> io::Result<()> {
        pages.clear();
        pages.resize(len.div_ceil(self.page_size) as usize, true);
        Ok(())
    }

    fn read_at(&self, address: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut read: SIZE_T = 0;

        // SAFETY: buf is writable for buf.len() bytes
        let ok = unsafe {
            ReadProcessMemory(
                GetCurrentProcess(),
                address as usize as LPVOID,
                buf.as_mut_ptr() as LPVOID,
                buf.len() as SIZE_T,
                &mut read,
            )
        };

        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        if read != buf.len() as SIZE_T {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short heap read"));
        }
        Ok(())
    }
}

/// Add the heap region count and committed heap bytes to `stats`
pub fn apply_heap_stats(stats: &mut MemoryStats) {
    let regions = heap_regions();
    stats.heap_regions = regions.len() as u64;
    stats.heap_bytes = heap_image::resident_bytes(&regions, &CurrentProcessMemory::new());
}

/// Copy every committed heap region into `sink`, up to `limit` bytes
pub fn write_heap_image(sink: &mut dyn Write, limit: u64) -> io::Result<u64> {
    let regions = heap_regions();
    heap_image::write_image(sink, &regions, &CurrentProcessMemory::new(), limit)
}
