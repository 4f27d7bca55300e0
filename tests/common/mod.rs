//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::io::{self, Write};
use std::path::PathBuf;

use proc_snapshot::{BuildInfo, MemoryStats, RuntimeInspector, SystemSource};

/// Inspector with fixed output whose dumps can be made to fail
#[derive(Default)]
pub struct ScriptedInspector {
    pub fail_stack_dump: bool,
    pub fail_heap_dump: bool,
}

impl ScriptedInspector {
    pub const STACK: &'static [u8] = b"thread 7 \"worker\" state=S\n";
    pub const HEAP: &'static [u8] = b"scripted heap image\n";
}

impl RuntimeInspector for ScriptedInspector {
    fn memory_stats(&self) -> MemoryStats {
        MemoryStats {
            resident_bytes: 1 << 20,
            virtual_bytes: 1 << 24,
            ..Default::default()
        }
    }

    fn task_count(&self) -> usize {
        2
    }

    fn current_stack(&self) -> String {
        "scripted\n".to_string()
    }

    fn stack_dump(&self, sink: &mut dyn Write) -> io::Result<()> {
        if self.fail_stack_dump {
            return Err(io::Error::new(io::ErrorKind::Other, "threads unavailable"));
        }
        sink.write_all(Self::STACK)
    }

    fn heap_dump(&self, sink: &mut dyn Write) -> io::Result<u64> {
        if self.fail_heap_dump {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "mem not readable"));
        }
        sink.write_all(Self::HEAP)?;
        Ok(Self::HEAP.len() as u64)
    }
}

/// Source whose fallible lookups all fail
pub struct BrokenSource;

impl SystemSource for BrokenSource {
    fn pid(&self) -> u32 {
        7
    }

    fn uid(&self) -> u32 {
        0
    }

    fn gid(&self) -> u32 {
        0
    }

    fn environ(&self) -> Vec<String> {
        Vec::new()
    }

    fn executable(&self) -> io::Result<PathBuf> {
        Err(io::Error::new(io::ErrorKind::NotFound, "no exe"))
    }

    fn working_dir(&self) -> io::Result<PathBuf> {
        Err(io::Error::new(io::ErrorKind::NotFound, "no cwd"))
    }

    fn hostname(&self) -> io::Result<String> {
        Err(io::Error::new(io::ErrorKind::Other, "no hostname"))
    }

    fn build_info(&self) -> Option<BuildInfo> {
        None
    }
}
