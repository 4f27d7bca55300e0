//! Heap image framing shared by every platform
//!
//! Platforms select their heap mappings and provide a [`RegionMemory`] that
//! reports page residency and reads bytes. This module walks the mappings
//! and writes only resident pages, so the image is bounded by the resident
//! set rather than by reserved address space.

use std::io::{self, Write};

use log::{debug, warn};

use crate::constants::{HEAP_DUMP_MAGIC, HEAP_DUMP_VERSION, MEMORY_CHUNK_SIZE};

/// A mapping selected for the heap image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapRegion {
    pub start: u64,
    pub end: u64,
    pub perms: String,
    pub offset: u64,
    /// Backing name, empty for anonymous memory
    pub name: String,
}

impl HeapRegion {
    pub fn size(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

/// Access to the memory of the current process
pub trait RegionMemory {
    fn page_size(&self) -> u64;

    /// Fill `pages` with the residency of each page in `[start, start + len)`.
    /// `start` is page aligned.
    fn residency(&self, start: u64, len: u64, pages: &mut Vec<bool>) -> io::Result<()>;

    /// Read exactly `buf.len()` bytes at `address`
    fn read_at(&self, address: u64, buf: &mut [u8]) -> io::Result<()>;
}

/// Page residency through `mincore`. Works on any mapping of the calling
/// process without touching its pages.
#[cfg(unix)]
pub fn mincore_residency(start: u64, len: u64, page_size: u64, pages: &mut Vec<bool>) -> io::Result<()> {
    let count = len.div_ceil(page_size) as usize;
    let mut vec = vec![0u8; count];

    // SAFETY: `vec` holds one byte per page of the queried range; mincore
    // only inspects page tables and never dereferences the range
    let rc = unsafe { libc::mincore(start as usize as *mut libc::c_void, len as usize, vec.as_mut_ptr() as _) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    pages.clear();
    pages.extend(vec.iter().map(|flags| flags & 1 != 0));
    Ok(())
}

/// Page size of the running system
#[cfg(unix)]
pub fn system_page_size() -> u64 {
    // SAFETY: sysconf has no preconditions
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as u64 } else { 4096 }
}

/// Resident bytes across `regions`. Regions whose residency cannot be
/// queried count as zero.
pub fn resident_bytes(regions: &[HeapRegion], memory: &dyn RegionMemory) -> u64 {
    let page = memory.page_size();
    let chunk = chunk_len(page);
    let mut pages = Vec::new();
    let mut total = 0u64;

    for region in regions {
        let mut offset = 0u64;
        while offset < region.size() {
            let len = chunk.min(region.size() - offset);
            match memory.residency(region.start + offset, len, &mut pages) {
                Ok(()) => total += resident_len(&pages, page, len),
                Err(e) => debug!("Residency of {:x} unknown: {}", region.start + offset, e),
            }
            offset += len;
        }
    }

    total
}

/// Write the heap image of `regions` to `sink`, copying at most `limit`
/// bytes of memory. Returns the number of memory bytes copied.
pub fn write_image(
    sink: &mut dyn Write,
    regions: &[HeapRegion],
    memory: &dyn RegionMemory,
    limit: u64,
) -> io::Result<u64> {
    let page = memory.page_size();
    writeln!(
        sink,
        "{} {} pid={} regions={} page={}",
        HEAP_DUMP_MAGIC,
        HEAP_DUMP_VERSION,
        std::process::id(),
        regions.len(),
        page
    )?;

    let mut budget = limit;
    let mut copied = 0u64;

    for (index, region) in regions.iter().enumerate() {
        let (region_copied, stopped) = write_region(sink, region, memory, &mut budget)?;
        copied += region_copied;

        let regions_left = index + 1 < regions.len();
        if stopped || (budget == 0 && regions_left) {
            warn!("Heap image reached its limit of {} bytes", limit);
            writeln!(sink, "truncated limit={}", limit)?;
            break;
        }
    }

    debug!("Heap image copied {} bytes from {} regions", copied, regions.len());
    Ok(copied)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    Nonresident,
    Unreadable,
}

impl SkipReason {
    fn as_str(self) -> &'static str {
        match self {
            SkipReason::Nonresident => "nonresident",
            SkipReason::Unreadable => "unreadable",
        }
    }
}

/// Writes the records of one region, merging adjacent skips
struct RegionFramer<'a> {
    sink: &'a mut dyn Write,
    pending_skip: Option<(u64, u64, SkipReason)>,
    copied: u64,
}

impl RegionFramer<'_> {
    fn skip(&mut self, offset: u64, len: u64, reason: SkipReason) -> io::Result<()> {
        if let Some((start, pending_len, pending_reason)) = self.pending_skip {
            if pending_reason == reason && start + pending_len == offset {
                self.pending_skip = Some((start, pending_len + len, reason));
                return Ok(());
            }
        }
        self.flush_skip()?;
        self.pending_skip = Some((offset, len, reason));
        Ok(())
    }

    fn data(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        self.flush_skip()?;
        writeln!(self.sink, "data {:x} {}", offset, bytes.len())?;
        self.sink.write_all(bytes)?;
        self.copied += bytes.len() as u64;
        Ok(())
    }

    fn flush_skip(&mut self) -> io::Result<()> {
        if let Some((offset, len, reason)) = self.pending_skip.take() {
            writeln!(self.sink, "skip {:x} {} {}", offset, len, reason.as_str())?;
        }
        Ok(())
    }

    fn finish(mut self) -> io::Result<u64> {
        self.flush_skip()?;
        writeln!(self.sink, "end {}", self.copied)?;
        Ok(self.copied)
    }
}

/// Write one region. Returns the bytes copied and whether the budget ran
/// out before the region was fully walked.
fn write_region(
    sink: &mut dyn Write,
    region: &HeapRegion,
    memory: &dyn RegionMemory,
    budget: &mut u64,
) -> io::Result<(u64, bool)> {
    let name = if region.name.is_empty() { "[anon]" } else { region.name.as_str() };
    writeln!(
        sink,
        "region {:x}-{:x} {} {:x} {}",
        region.start, region.end, region.perms, region.offset, name
    )?;

    let page = memory.page_size();
    let chunk = chunk_len(page);
    let mut framer = RegionFramer { sink, pending_skip: None, copied: 0 };
    let mut pages = Vec::new();
    let mut offset = 0u64;

    while offset < region.size() {
        let len = chunk.min(region.size() - offset);

        if let Err(e) = memory.residency(region.start + offset, len, &mut pages) {
            debug!("Residency of {:x} unknown: {}", region.start + offset, e);
            framer.skip(offset, len, SkipReason::Unreadable)?;
            offset += len;
            continue;
        }

        for (run_start, run_len, resident) in page_runs(&pages, page, len) {
            let run_offset = offset + run_start;
            if !resident {
                framer.skip(run_offset, run_len, SkipReason::Nonresident)?;
                continue;
            }
            if *budget == 0 {
                let copied = framer.finish()?;
                return Ok((copied, true));
            }

            let take = run_len.min(*budget);
            copy_run(&mut framer, memory, region.start, run_offset, take, page, budget)?;
            if take < run_len {
                let copied = framer.finish()?;
                return Ok((copied, true));
            }
        }

        offset += len;
    }

    let copied = framer.finish()?;
    Ok((copied, false))
}

/// Copy `len` resident bytes at `run_offset`, falling back to page sized
/// reads when the whole run cannot be read at once
fn copy_run(
    framer: &mut RegionFramer<'_>,
    memory: &dyn RegionMemory,
    base: u64,
    run_offset: u64,
    len: u64,
    page: u64,
    budget: &mut u64,
) -> io::Result<()> {
    let mut buffer = vec![0u8; len as usize];
    if memory.read_at(base + run_offset, &mut buffer).is_ok() {
        framer.data(run_offset, &buffer)?;
        *budget -= len;
        return Ok(());
    }

    let mut done = 0u64;
    while done < len {
        let piece = page.min(len - done);
        let slice = &mut buffer[..piece as usize];
        match memory.read_at(base + run_offset + done, slice) {
            Ok(()) => {
                framer.data(run_offset + done, slice)?;
                *budget -= piece;
            }
            Err(e) => {
                debug!("Heap bytes at {:x} unreadable: {}", base + run_offset + done, e);
                framer.skip(run_offset + done, piece, SkipReason::Unreadable)?;
            }
        }
        done += piece;
    }

    Ok(())
}

/// Chunk length used for residency queries and reads, a multiple of the page
fn chunk_len(page: u64) -> u64 {
    let pages = (MEMORY_CHUNK_SIZE as u64 / page).max(1);
    pages * page
}

/// Split `len` bytes described by per-page residency into runs of
/// `(offset, len, resident)`
fn page_runs(pages: &[bool], page: u64, len: u64) -> Vec<(u64, u64, bool)> {
    let mut runs: Vec<(u64, u64, bool)> = Vec::new();

    for (index, resident) in pages.iter().copied().enumerate() {
        let start = index as u64 * page;
        if start >= len {
            break;
        }
        let page_len = page.min(len - start);

        match runs.last_mut() {
            Some(last) if last.2 == resident => last.1 += page_len,
            _ => runs.push((start, page_len, resident)),
        }
    }

    runs
}

fn resident_len(pages: &[bool], page: u64, len: u64) -> u64 {
    page_runs(pages, page, len)
        .iter()
        .filter(|(_, _, resident)| *resident)
        .map(|(_, len, _)| len)
        .sum()
}
