//! Test utilities for proc-snapshot
//!
//! Fixture sources for the collector and archiver, and generators for the
//! records they produce.

#![cfg(test)]

/// Inspectors that return fixed values instead of reading the process
pub mod fakes {
    use std::io::{self, Write};

    use crate::collectors::runtime::RuntimeInspector;
    use crate::collectors::snapshot::models::{GcStats, MemoryStats};

    use super::generators;

    /// Runtime inspector returning fixture values, optionally failing its
    /// dumps
    #[derive(Debug, Default, Clone)]
    pub struct FakeInspector {
        fail_stack_dump: bool,
        fail_heap_dump: bool,
    }

    impl FakeInspector {
        pub const STACK_DUMP: &'static [u8] = b"thread 1 \"main\" state=R\n  fixture frame\n";
        pub const HEAP_IMAGE: &'static [u8] = b"PROCSNAP-HEAP 2 pid=4242 regions=0 page=4096\n";
        pub const CURRENT_STACK: &'static str = "main\n  at fixture.rs:1\n";

        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_stack_dump(mut self) -> Self {
            self.fail_stack_dump = true;
            self
        }

        pub fn failing_heap_dump(mut self) -> Self {
            self.fail_heap_dump = true;
            self
        }
    }

    impl RuntimeInspector for FakeInspector {
        fn memory_stats(&self) -> MemoryStats {
            generators::test_memory_stats()
        }

        fn gc_stats(&self) -> GcStats {
            generators::test_gc_stats()
        }

        fn task_count(&self) -> usize {
            3
        }

        fn current_stack(&self) -> String {
            Self::CURRENT_STACK.to_string()
        }

        fn stack_dump(&self, sink: &mut dyn Write) -> io::Result<()> {
            if self.fail_stack_dump {
                return Err(io::Error::new(io::ErrorKind::Other, "stack capture failed"));
            }
            sink.write_all(Self::STACK_DUMP)
        }

        fn heap_dump(&self, sink: &mut dyn Write) -> io::Result<u64> {
            if self.fail_heap_dump {
                // Part of the image reaches the temp file before the failure
                sink.write_all(&Self::HEAP_IMAGE[..8])?;
                return Err(io::Error::new(io::ErrorKind::Other, "heap walk failed"));
            }
            sink.write_all(Self::HEAP_IMAGE)?;
            Ok(0)
        }
    }
}

/// Test data generators for common types
pub mod generators {
    use std::io;
    use std::path::PathBuf;

    use chrono::{TimeZone, Utc};

    use crate::collectors::snapshot::models::{BuildInfo, GcStats, MemoryStats, Module, Snapshot};
    use crate::collectors::system::SystemSource;

    const TEST_RESIDENT: u64 = 48 * 1024 * 1024; // 48MB
    const TEST_VIRTUAL: u64 = 512 * 1024 * 1024; // 512MB
    const TEST_HEAP: u64 = 16 * 1024 * 1024; // 16MB

    /// Source answering every lookup with fixture values
    #[derive(Debug, Clone, Copy)]
    pub struct FixtureSource;

    impl SystemSource for FixtureSource {
        fn pid(&self) -> u32 {
            4242
        }

        fn uid(&self) -> u32 {
            1000
        }

        fn gid(&self) -> u32 {
            100
        }

        fn environ(&self) -> Vec<String> {
            vec!["HOME=/root".to_string(), "DB_PASSWORD=hunter2".to_string()]
        }

        fn executable(&self) -> io::Result<PathBuf> {
            Ok(PathBuf::from("/usr/local/bin/service"))
        }

        fn working_dir(&self) -> io::Result<PathBuf> {
            Ok(PathBuf::from("/srv/service"))
        }

        fn hostname(&self) -> io::Result<String> {
            Ok("test-host".to_string())
        }

        fn build_info(&self) -> Option<BuildInfo> {
            Some(test_build_info())
        }
    }

    pub fn fixture_source() -> FixtureSource {
        FixtureSource
    }

    /// Generate test MemoryStats
    pub fn test_memory_stats() -> MemoryStats {
        MemoryStats {
            resident_bytes: TEST_RESIDENT,
            virtual_bytes: TEST_VIRTUAL,
            peak_resident_bytes: TEST_RESIDENT + 4096,
            peak_virtual_bytes: TEST_VIRTUAL,
            data_bytes: TEST_HEAP * 2,
            stack_bytes: 132 * 1024,
            swap_bytes: 0,
            heap_bytes: TEST_HEAP,
            heap_regions: 5,
            ..Default::default()
        }
    }

    /// Generate test GcStats
    pub fn test_gc_stats() -> GcStats {
        GcStats {
            num_gc: 2,
            pause_total_ns: 1_500,
            pauses_ns: vec![1_000, 500],
            last_gc: Utc.timestamp_opt(1_700_000_000, 0).single(),
        }
    }

    /// Generate test BuildInfo
    pub fn test_build_info() -> BuildInfo {
        BuildInfo {
            path: "service".to_string(),
            version: "1.2.3".to_string(),
            rust_version: "rustc 1.75.0 (82e1608df 2023-12-21)".to_string(),
            target: "x86_64-unknown-linux-gnu".to_string(),
            profile: "release".to_string(),
            deps: vec![Module {
                path: "serde".to_string(),
                version: "1.0.200".to_string(),
            }],
        }
    }

    /// Generate a test Snapshot matching the fixture sources
    pub fn test_snapshot() -> Snapshot {
        Snapshot {
            memory: test_memory_stats(),
            gc: test_gc_stats(),
            stack: "main\n  at fixture.rs:1\n".to_string(),
            build_info: test_build_info(),
            num_tasks: 3,
            pid: 4242,
            uid: 1000,
            gid: 100,
            environ: vec!["HOME=/root".to_string()],
            executable: "/usr/local/bin/service".to_string(),
            wd: "/srv/service".to_string(),
            hostname: "test-host".to_string(),
            collected_at: Utc.timestamp_opt(1_700_000_100, 0).unwrap(),
        }
    }
}
