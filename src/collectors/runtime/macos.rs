//! macOS-specific runtime introspection
//!
//! Heap regions are the VM regions tagged by the malloc zones. They are
//! enumerated with `mach_vm_region` and read with `mach_vm_read_overwrite`
//! on the task's own port, which needs no extra privileges.

use std::io::{self, Write};
use std::mem;

use log::{debug, warn};
use mach::kern_return::KERN_SUCCESS;
use mach::message::mach_msg_type_number_t;
use mach::port::mach_port_t;
use mach::traps::mach_task_self;
use mach::vm::{mach_vm_read_overwrite, mach_vm_region};
use mach::vm_prot::{VM_PROT_EXECUTE, VM_PROT_READ, VM_PROT_WRITE};
use mach::vm_region::{vm_region_extended_info_data_t, vm_region_info_t, VM_REGION_EXTENDED_INFO};
use mach::vm_types::{mach_vm_address_t, mach_vm_size_t};

use crate::collectors::runtime::heap_image::{self, HeapRegion, RegionMemory};
use crate::collectors::snapshot::models::MemoryStats;

/// `VM_MEMORY_*` user tags owned by the malloc zones
const MALLOC_TAGS: [(u32, &str); 10] = [
    (1, "MALLOC"),
    (2, "MALLOC_SMALL"),
    (3, "MALLOC_LARGE"),
    (4, "MALLOC_HUGE"),
    (6, "REALLOC"),
    (7, "MALLOC_TINY"),
    (8, "MALLOC_LARGE_REUSABLE"),
    (9, "MALLOC_LARGE_REUSED"),
    (11, "MALLOC_NANO"),
    (12, "MALLOC_MEDIUM"),
];

/// One region reported by `mach_vm_region`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmRegion {
    pub start: u64,
    pub end: u64,
    pub protection: i32,
    pub user_tag: u32,
}

impl VmRegion {
    /// Readable, writable and owned by a malloc zone. Thread stacks carry
    /// their own tag and never match.
    pub fn is_heap(&self) -> bool {
        let rw = VM_PROT_READ | VM_PROT_WRITE;
        self.protection & rw == rw && malloc_tag_name(self.user_tag).is_some()
    }

    fn to_region(&self) -> HeapRegion {
        HeapRegion {
            start: self.start,
            end: self.end,
            perms: protection_string(self.protection),
            offset: 0,
            name: malloc_tag_name(self.user_tag).unwrap_or_default().to_string(),
        }
    }
}

fn malloc_tag_name(tag: u32) -> Option<&'static str> {
    MALLOC_TAGS.iter().find(|(t, _)| *t == tag).map(|(_, name)| *name)
}

/// Protection in the `rwxp` notation of the other platforms
pub fn protection_string(protection: i32) -> String {
    let flag = |bit: i32, c: char| if protection & bit != 0 { c } else { '-' };
    format!(
        "{}{}{}p",
        flag(VM_PROT_READ, 'r'),
        flag(VM_PROT_WRITE, 'w'),
        flag(VM_PROT_EXECUTE, 'x')
    )
}

/// Every VM region of the current task
pub fn vm_regions() -> Vec<VmRegion> {
    let mut regions = Vec::new();
    let mut address: mach_vm_address_t = 0;

    loop {
        let mut info: vm_region_extended_info_data_t = unsafe { mem::zeroed() };
        let mut count = (mem::size_of::<vm_region_extended_info_data_t>() / mem::size_of::<libc::c_int>())
            as mach_msg_type_number_t;
        let mut object_name: mach_port_t = 0;
        let mut size: mach_vm_size_t = 0;

        // SAFETY: info, count and object_name outlive the call and count
        // matches the size of info
        let kr = unsafe {
            mach_vm_region(
                mach_task_self(),
                &mut address,
                &mut size,
                VM_REGION_EXTENDED_INFO,
                &mut info as *mut _ as vm_region_info_t,
                &mut count,
                &mut object_name,
            )
        };

        if kr != KERN_SUCCESS {
            // End of the address space
            break;
        }

        regions.push(VmRegion {
            start: address,
            end: address + size,
            protection: info.protection,
            user_tag: info.user_tag,
        });

        address += size;
    }

    debug!("Found {} VM regions", regions.len());
    regions
}

/// Heap regions of the current task
pub fn heap_regions() -> Vec<HeapRegion> {
    vm_regions().iter().filter(|r| r.is_heap()).map(VmRegion::to_region).collect()
}

/// Memory of the current task
pub struct TaskMemory {
    page_size: u64,
}

impl TaskMemory {
    pub fn new() -> Self {
        Self {
            page_size: heap_image::system_page_size(),
        }
    }
}

impl RegionMemory for TaskMemory {
    fn page_size(&self) -> u64 {
        self.page_size
    }

    fn residency(&self, start: u64, len: u64, pages: &mut Vec<bool>) -> io::Result<()> {
        heap_image::mincore_residency(start, len, self.page_size, pages)
    }

    fn read_at(&self, address: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut out_size: mach_vm_size_t = 0;

        // SAFETY: the kernel writes at most buf.len() bytes into buf
        let kr = unsafe {
            mach_vm_read_overwrite(
                mach_task_self(),
                address,
                buf.len() as mach_vm_size_t,
                buf.as_mut_ptr() as mach_vm_address_t,
                &mut out_size,
            )
        };

        if kr != KERN_SUCCESS {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("mach_vm_read_overwrite at {:x} failed: {}", address, kr),
            ));
        }
        if out_size as usize != buf.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short heap read"));
        }
        Ok(())
    }
}

/// Add the heap region count and resident heap bytes to `stats`
pub fn apply_heap_stats(stats: &mut MemoryStats) {
    let regions = heap_regions();
    if regions.is_empty() {
        warn!("No malloc regions found");
    }
    stats.heap_regions = regions.len() as u64;
    stats.heap_bytes = heap_image::resident_bytes(&regions, &TaskMemory::new());
}

/// Copy the resident pages of every malloc region into `sink`, up to
/// `limit` bytes
pub fn write_heap_image(sink: &mut dyn Write, limit: u64) -> io::Result<u64> {
    let regions = heap_regions();
    heap_image::write_image(sink, &regions, &TaskMemory::new(), limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_selection() {
        let malloc = VmRegion { start: 0x1000, end: 0x2000, protection: VM_PROT_READ | VM_PROT_WRITE, user_tag: 2 };
        let stack = VmRegion { user_tag: 30, ..malloc.clone() };
        let readonly = VmRegion { protection: VM_PROT_READ, ..malloc.clone() };

        assert!(malloc.is_heap());
        assert!(!stack.is_heap());
        assert!(!readonly.is_heap());
        assert_eq!(malloc.to_region().name, "MALLOC_SMALL");
        assert_eq!(malloc.to_region().perms, "rw-p");
    }

    #[test]
    fn test_live_allocation_is_in_heap_regions() {
        let data = vec![0x5Au8; 256 * 1024];
        let address = data.as_ptr() as u64;

        let regions = heap_regions();
        assert!(regions.iter().any(|r| r.start <= address && address < r.end));
    }

    #[test]
    fn test_heap_image_copies_resident_bytes() {
        let mut image = Vec::new();
        let copied = write_heap_image(&mut image, 64 * 1024).unwrap();

        assert_eq!(copied, 64 * 1024);
        assert!(image.starts_with(b"PROCSNAP-HEAP 2 "));
    }
}
