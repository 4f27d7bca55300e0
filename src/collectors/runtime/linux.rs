//! Linux-specific runtime introspection
//!
//! Reads the current process through the /proc filesystem: memory figures
//! from `status`, heap mappings from `maps`, heap contents from `mem` and
//! per-thread state from `task/`. User stacks of other threads come from
//! the signal sampler.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use log::{debug, warn};

use crate::collectors::runtime::heap_image::{self, HeapRegion, RegionMemory};
use crate::collectors::runtime::{common, sampler};
use crate::collectors::snapshot::models::MemoryStats;
use crate::constants::{
    PROC_SELF_MAPS, PROC_SELF_MEM, PROC_SELF_STATUS, PROC_SELF_TASKS, STACK_SAMPLE_TIMEOUT_MS,
    THREAD_GUARD_MAX_BYTES,
};

/// One line of `/proc/<pid>/maps`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    pub start: u64,
    pub end: u64,
    pub perms: String,
    pub offset: u64,
    pub path: String,
}

impl MapEntry {
    pub fn size(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Private writable mapping that is either the brk heap or anonymous
    pub fn is_heap(&self) -> bool {
        let bytes = self.perms.as_bytes();
        let private_rw = bytes.len() >= 4 && bytes[0] == b'r' && bytes[1] == b'w' && bytes[3] == b'p';
        private_rw && (self.path.is_empty() || self.path == "[heap]")
    }

    fn is_guard(&self) -> bool {
        self.perms.starts_with("---") && self.path.is_empty() && self.size() <= THREAD_GUARD_MAX_BYTES
    }

    fn contains(&self, address: u64) -> bool {
        self.start <= address && address < self.end
    }

    fn to_region(&self) -> HeapRegion {
        HeapRegion {
            start: self.start,
            end: self.end,
            perms: self.perms.clone(),
            offset: self.offset,
            name: self.path.clone(),
        }
    }
}

/// Parse the contents of a maps file, skipping malformed lines
pub fn parse_maps(content: &str) -> Vec<MapEntry> {
    let mut entries = Vec::new();

    for line in content.lines() {
        // Example line:
        // 55d3195fc000-55d319619000 rw-p 00000000 08:05 1048602 /usr/bin/bash

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 5 {
            continue;
        }

        let Some((start, end)) = parts[0].split_once('-') else {
            debug!("Invalid address range in maps: {}", parts[0]);
            continue;
        };

        let (Ok(start), Ok(end)) = (u64::from_str_radix(start, 16), u64::from_str_radix(end, 16)) else {
            debug!("Unparseable address range in maps: {}", parts[0]);
            continue;
        };

        let offset = u64::from_str_radix(parts[2], 16).unwrap_or(0);
        let path = if parts.len() >= 6 { parts[5..].join(" ") } else { String::new() };

        entries.push(MapEntry {
            start,
            end,
            perms: parts[1].to_string(),
            offset,
            path,
        });
    }

    entries
}

/// Parse `Key:   value kB` lines of a status file. Values with a `kB` unit
/// are converted to bytes.
pub fn parse_status(content: &str) -> HashMap<String, u64> {
    let mut values = HashMap::new();

    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };

        let mut fields = rest.split_whitespace();
        let Some(Ok(value)) = fields.next().map(str::parse::<u64>) else {
            continue;
        };

        let value = match fields.next() {
            Some("kB") => value * 1024,
            _ => value,
        };
        values.insert(key.trim().to_string(), value);
    }

    values
}

/// Select the heap mappings of `maps`, leaving out thread stacks.
///
/// A mapping is a thread stack when it sits directly above a small
/// inaccessible guard mapping or holds one of `stack_pointers`.
pub fn heap_regions(maps: &[MapEntry], stack_pointers: &[u64]) -> Vec<HeapRegion> {
    let mut regions = Vec::new();

    for (index, entry) in maps.iter().enumerate() {
        if !entry.is_heap() {
            continue;
        }

        let guarded = index > 0 && maps[index - 1].end == entry.start && maps[index - 1].is_guard();
        let holds_stack = stack_pointers.iter().any(|sp| entry.contains(*sp));
        if entry.path.is_empty() && (guarded || holds_stack) {
            debug!("Skipping thread stack {:x}-{:x}", entry.start, entry.end);
            continue;
        }

        regions.push(entry.to_region());
    }

    regions
}

/// Stack pointers of every thread: the calling thread's from a local, the
/// others from `task/<tid>/syscall`. Threads that are running report no
/// pointer.
pub fn thread_stack_pointers() -> Vec<u64> {
    let here = 0u8;
    let mut pointers = vec![&here as *const u8 as u64];

    let Ok(entries) = fs::read_dir(PROC_SELF_TASKS) else {
        return pointers;
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path().join("syscall");
        if let Some(sp) = fs::read_to_string(&path).ok().as_deref().and_then(parse_syscall_stack_pointer) {
            pointers.push(sp);
        }
    }

    pointers
}

/// Stack pointer field of a `task/<tid>/syscall` line. The line ends with
/// the stack pointer and program counter unless the thread is running.
pub fn parse_syscall_stack_pointer(content: &str) -> Option<u64> {
    let fields: Vec<&str> = content.split_whitespace().collect();
    if fields.len() < 3 {
        return None;
    }

    let sp = fields[fields.len() - 2];
    u64::from_str_radix(sp.trim_start_matches("0x"), 16).ok()
}

/// Heap mappings of the live process
pub fn live_heap_regions() -> io::Result<Vec<HeapRegion>> {
    let maps = fs::read_to_string(PROC_SELF_MAPS)?;
    Ok(heap_regions(&parse_maps(&maps), &thread_stack_pointers()))
}

/// Memory of the current process read through `/proc/self/mem`
pub struct ProcMemory {
    mem: File,
    page_size: u64,
}

impl ProcMemory {
    pub fn open() -> io::Result<Self> {
        Ok(Self {
            mem: File::open(PROC_SELF_MEM)?,
            page_size: heap_image::system_page_size(),
        })
    }
}

impl RegionMemory for ProcMemory {
    fn page_size(&self) -> u64 {
        self.page_size
    }

    fn residency(&self, start: u64, len: u64, pages: &mut Vec<bool>) -> io::Result<()> {
        heap_image::mincore_residency(start, len, self.page_size, pages)
    }

    fn read_at(&self, address: u64, buf: &mut [u8]) -> io::Result<()> {
        self.mem.read_exact_at(buf, address)
    }
}

/// Memory statistics from /proc, falling back to sysinfo when status is
/// unreadable. `heap_bytes` counts resident heap pages only.
pub fn memory_stats() -> MemoryStats {
    let mut stats = match fs::read_to_string(PROC_SELF_STATUS) {
        Ok(content) => {
            let status = parse_status(&content);
            let get = |key: &str| status.get(key).copied().unwrap_or(0);

            MemoryStats {
                resident_bytes: get("VmRSS"),
                virtual_bytes: get("VmSize"),
                peak_resident_bytes: get("VmHWM"),
                peak_virtual_bytes: get("VmPeak"),
                data_bytes: get("VmData"),
                stack_bytes: get("VmStk"),
                swap_bytes: get("VmSwap"),
                ..Default::default()
            }
        }
        Err(e) => {
            warn!("Failed to read {}: {}", PROC_SELF_STATUS, e);
            common::sysinfo_memory_stats().unwrap_or_default()
        }
    };

    match live_heap_regions() {
        Ok(regions) => {
            stats.heap_regions = regions.len() as u64;
            match ProcMemory::open() {
                Ok(memory) => stats.heap_bytes = heap_image::resident_bytes(&regions, &memory),
                Err(e) => warn!("Failed to open {}: {}", PROC_SELF_MEM, e),
            }
        }
        Err(e) => warn!("Failed to read {}: {}", PROC_SELF_MAPS, e),
    }

    stats
}

/// Number of threads in the process
pub fn task_count() -> usize {
    if let Ok(content) = fs::read_to_string(PROC_SELF_STATUS) {
        if let Some(threads) = parse_status(&content).get("Threads") {
            return *threads as usize;
        }
    }

    match fs::read_dir(PROC_SELF_TASKS) {
        Ok(entries) => entries.filter_map(|e| e.ok()).count(),
        Err(e) => {
            warn!("Failed to list {}: {}", PROC_SELF_TASKS, e);
            0
        }
    }
}

fn read_trimmed(path: &Path) -> io::Result<String> {
    fs::read_to_string(path).map(|s| s.trim().to_string())
}

/// Write one section per thread listed under /proc/self/task, each with
/// the thread's user stack
pub fn write_thread_dump(sink: &mut dyn Write) -> io::Result<()> {
    let mut tids: Vec<i64> = fs::read_dir(PROC_SELF_TASKS)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str().and_then(|name| name.parse().ok()))
        .collect();
    tids.sort_unstable();

    writeln!(
        sink,
        "thread dump pid={} threads={} at {}",
        std::process::id(),
        tids.len(),
        Utc::now().to_rfc3339()
    )?;
    writeln!(sink)?;

    let current = sampler::current_tid();
    let timeout = Duration::from_millis(STACK_SAMPLE_TIMEOUT_MS);
    let thread_sampler = match sampler::ThreadSampler::install() {
        Ok(thread_sampler) => Some(thread_sampler),
        Err(e) => {
            warn!("Failed to install stack sampler: {}", e);
            None
        }
    };

    for tid in &tids {
        let frames = if *tid == current {
            Ok(sampler::capture_current())
        } else {
            match &thread_sampler {
                Some(thread_sampler) => thread_sampler.sample(*tid, timeout),
                None => Err(io::Error::new(io::ErrorKind::Unsupported, "no stack sampler")),
            }
        };

        write_thread_section(sink, *tid, *tid == current, frames)?;
    }

    Ok(())
}

fn write_thread_section(
    sink: &mut dyn Write,
    tid: i64,
    current: bool,
    frames: io::Result<Vec<usize>>,
) -> io::Result<()> {
    let task_dir = Path::new(PROC_SELF_TASKS).join(tid.to_string());

    // Threads may exit while we iterate; report them instead of failing
    let name = match read_trimmed(&task_dir.join("comm")) {
        Ok(name) => name,
        Err(e) => {
            writeln!(sink, "thread {} exited during dump ({})", tid, e)?;
            writeln!(sink)?;
            return Ok(());
        }
    };

    let state = fs::read_to_string(task_dir.join("status"))
        .ok()
        .and_then(|status| {
            status
                .lines()
                .find_map(|line| line.strip_prefix("State:").map(|s| s.trim().to_string()))
        })
        .unwrap_or_else(|| "unknown".to_string());

    let marker = if current { " (current)" } else { "" };
    writeln!(sink, "thread {} \"{}\" state={}{}", tid, name, state, marker)?;

    match read_trimmed(&task_dir.join("wchan")) {
        Ok(wchan) if !wchan.is_empty() && wchan != "0" => writeln!(sink, "    wchan: {}", wchan)?,
        _ => {}
    }

    match frames {
        Ok(frames) => {
            writeln!(sink, "    user stack:")?;
            sampler::write_frames(sink, &frames)?;
        }
        Err(e) => writeln!(sink, "    user stack: unavailable ({})", e)?,
    }

    // The kernel stack is root-only on most systems
    if let Ok(stack) = read_trimmed(&task_dir.join("stack")) {
        if !stack.is_empty() {
            writeln!(sink, "    kernel stack:")?;
            for frame in stack.lines() {
                writeln!(sink, "        {}", frame)?;
            }
        }
    }

    writeln!(sink)?;
    Ok(())
}

/// Copy the resident pages of every heap mapping into `sink`, up to
/// `limit` bytes. Thread stacks and pages never touched are left out.
pub fn write_heap_image(sink: &mut dyn Write, limit: u64) -> io::Result<u64> {
    let regions = live_heap_regions()?;
    let memory = ProcMemory::open()?;
    heap_image::write_image(sink, &regions, &memory, limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::HEAP_DUMP_MAGIC;
    use std::sync::mpsc;
    use std::thread;

    const SAMPLE_MAPS: &str = "\
55d3195fc000-55d319619000 r--p 00000000 08:05 1048602 /usr/bin/bash
55d31a000000-55d31a021000 rw-p 00000000 00:00 0 [heap]
7f0000000000-7f0000021000 rw-p 00000000 00:00 0
7f0000021000-7f0004000000 ---p 00000000 00:00 0
7f1000000000-7f1000001000 rw-s 00000000 00:05 42 /dev/shm/region
7ffd00000000-7ffd00021000 rw-p 00000000 00:00 0 [stack]
garbage line
";

    /// Two spawned thread stacks (guard page then stack) around a malloc arena
    const THREADED_MAPS: &str = "\
55d31a000000-55d31a021000 rw-p 00000000 00:00 0 [heap]
7f2000000000-7f2000001000 ---p 00000000 00:00 0
7f2000001000-7f2000201000 rw-p 00000000 00:00 0
7f3000000000-7f3000400000 rw-p 00000000 00:00 0
7f3000400000-7f3004000000 ---p 00000000 00:00 0
7f4000000000-7f4000200000 rw-p 00000000 00:00 0
";

    #[test]
    fn test_parse_maps() {
        let entries = parse_maps(SAMPLE_MAPS);
        assert_eq!(entries.len(), 6);

        assert_eq!(entries[0].start, 0x55d3195fc000);
        assert_eq!(entries[0].end, 0x55d319619000);
        assert_eq!(entries[0].perms, "r--p");
        assert_eq!(entries[0].path, "/usr/bin/bash");

        assert_eq!(entries[2].path, "");
        assert_eq!(entries[2].size(), 0x21000);
    }

    #[test]
    fn test_heap_region_selection() {
        let heap = heap_regions(&parse_maps(SAMPLE_MAPS), &[]);

        // [heap] and the anonymous rw-p mapping; not the guard, shared or stack mappings
        assert_eq!(heap.len(), 2);
        assert_eq!(heap[0].name, "[heap]");
        assert_eq!(heap[1].start, 0x7f0000000000);
    }

    #[test]
    fn test_thread_stacks_are_not_heap() {
        let maps = parse_maps(THREADED_MAPS);

        // The guarded mapping is a stack; the one holding a stack pointer too
        let heap = heap_regions(&maps, &[0x7f40001ff000]);

        let starts: Vec<u64> = heap.iter().map(|r| r.start).collect();
        assert_eq!(starts, vec![0x55d31a000000, 0x7f3000000000]);
    }

    #[test]
    fn test_parse_syscall_stack_pointer() {
        let blocked = "202 0x7f3a1c000b60 0x80 0x0 0x0 0x0 0x0 0x7f3a1bffe9d0 0x7f3a1e2a4a3d\n";
        assert_eq!(parse_syscall_stack_pointer(blocked), Some(0x7f3a1bffe9d0));

        let outside_syscall = "-1 0x7ffc1a2b3c40 0x55d3195fd123\n";
        assert_eq!(parse_syscall_stack_pointer(outside_syscall), Some(0x7ffc1a2b3c40));

        assert_eq!(parse_syscall_stack_pointer("running\n"), None);
    }

    #[test]
    fn test_parse_status() {
        let content = "Name:\tcargo\nVmPeak:\t  2048 kB\nVmRSS:\t    512 kB\nThreads:\t7\nCpus_allowed_list:\t0-3\n";
        let status = parse_status(content);

        assert_eq!(status.get("VmPeak"), Some(&(2048 * 1024)));
        assert_eq!(status.get("VmRSS"), Some(&(512 * 1024)));
        assert_eq!(status.get("Threads"), Some(&7));
        assert!(status.get("Name").is_none());
        assert!(status.get("Cpus_allowed_list").is_none());
    }

    #[test]
    fn test_memory_stats_from_proc() {
        let stats = memory_stats();

        assert!(stats.resident_bytes > 0);
        assert!(stats.peak_resident_bytes >= stats.resident_bytes);
        assert!(stats.heap_regions > 0);
        assert!(stats.heap_bytes > 0);
    }

    #[test]
    fn test_heap_bytes_are_resident() {
        let stats = memory_stats();

        // Resident heap pages are part of the resident set
        let slack = 8 * 1024 * 1024;
        assert!(stats.heap_bytes <= stats.resident_bytes + slack);
    }

    #[test]
    fn test_task_count_sees_spawned_thread() {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            ready_tx.send(()).unwrap();
            done_rx.recv().ok();
        });

        ready_rx.recv().unwrap();
        assert!(task_count() >= 2);

        done_tx.send(()).unwrap();
        handle.join().unwrap();
    }

    #[inline(never)]
    fn parked_snapshot_worker(ready: mpsc::Sender<()>, release: mpsc::Receiver<()>) {
        ready.send(()).unwrap();
        release.recv().ok();
    }

    #[test]
    fn test_thread_dump_includes_user_stack_of_named_thread() {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("snapshot-worker".to_string())
            .spawn(move || parked_snapshot_worker(ready_tx, done_rx))
            .unwrap();

        ready_rx.recv().unwrap();
        thread::sleep(Duration::from_millis(20));
        let mut buffer = Vec::new();
        write_thread_dump(&mut buffer).unwrap();
        done_tx.send(()).unwrap();
        handle.join().unwrap();

        let text = String::from_utf8_lossy(&buffer);
        assert!(text.starts_with("thread dump pid="));
        assert!(text.contains("\"snapshot-worker\""));
        assert!(text.contains("parked_snapshot_worker"), "{}", text);
        assert!(text.contains("(current)"));
        assert!(text.contains("test_thread_dump_includes_user_stack_of_named_thread"));
    }

    /// Keeps the first bytes written and counts the rest
    struct HeadWriter {
        head: Vec<u8>,
        total: u64,
    }

    impl Write for HeadWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let room = 4096usize.saturating_sub(self.head.len());
            self.head.extend_from_slice(&buf[..room.min(buf.len())]);
            self.total += buf.len() as u64;
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn resident_set() -> u64 {
        let status = fs::read_to_string(PROC_SELF_STATUS).unwrap();
        parse_status(&status)["VmRSS"]
    }

    #[test]
    fn test_heap_image_framing() {
        // Keep a recognizable allocation alive while dumping
        let marker = vec![0xA5u8; 64 * 1024];

        let mut sink = HeadWriter { head: Vec::new(), total: 0 };
        let copied = write_heap_image(&mut sink, u64::MAX).unwrap();

        assert!(copied > 0);
        assert!(sink.total > copied);

        let text = String::from_utf8_lossy(&sink.head);
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with(&format!("{} 2 ", HEAP_DUMP_MAGIC)));
        assert!(header.contains(&format!("pid={}", std::process::id())));
        assert!(lines.next().unwrap().starts_with("region "));
        assert_eq!(marker[0], 0xA5);
    }

    #[test]
    fn test_heap_image_tracks_resident_set_with_idle_threads() {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = std::sync::Arc::new(std::sync::Mutex::new(release_rx));

        let workers: Vec<_> = (0..16)
            .map(|_| {
                let ready = ready_tx.clone();
                let release = release_rx.clone();
                thread::spawn(move || {
                    ready.send(()).unwrap();
                    let _ = release.lock().unwrap_or_else(|p| p.into_inner()).recv();
                })
            })
            .collect();
        for _ in 0..16 {
            ready_rx.recv().unwrap();
        }

        let before = resident_set();
        let mut sink = HeadWriter { head: Vec::new(), total: 0 };
        let copied = write_heap_image(&mut sink, u64::MAX).unwrap();
        let after = resident_set();

        drop(release_tx);
        for worker in workers {
            worker.join().unwrap();
        }

        // Reserved address space is far larger than this; only touched
        // heap pages may be copied
        let slack = 8 * 1024 * 1024;
        assert!(
            copied <= before.max(after) + slack,
            "copied={} rss_before={} rss_after={}",
            copied,
            before,
            after
        );
    }

    #[test]
    fn test_spawned_thread_stack_is_excluded() {
        let (addr_tx, addr_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            let local = [0u8; 64];
            addr_tx.send(local.as_ptr() as u64).unwrap();
            release_rx.recv().ok();
            assert_eq!(local[0], 0);
        });

        let address = addr_rx.recv().unwrap();
        thread::sleep(Duration::from_millis(20));
        let regions = live_heap_regions().unwrap();
        release_tx.send(()).unwrap();
        handle.join().unwrap();

        assert!(
            !regions.iter().any(|r| r.start <= address && address < r.end),
            "thread stack address {:x} selected as heap",
            address
        );
    }

    #[test]
    fn test_heap_image_limit_truncates() {
        let mut sink = HeadWriter { head: Vec::new(), total: 0 };
        let copied = write_heap_image(&mut sink, 0).unwrap();

        assert_eq!(copied, 0);
        let text = String::from_utf8_lossy(&sink.head);
        assert!(text.contains("truncated limit=0"));
    }

    #[test]
    fn test_heap_image_limit_is_exact() {
        let mut sink = HeadWriter { head: Vec::new(), total: 0 };
        let copied = write_heap_image(&mut sink, 6000).unwrap();

        assert_eq!(copied, 6000);
    }
}
