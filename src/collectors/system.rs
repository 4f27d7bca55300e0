//! Operating system lookups for process identity and environment
//!
//! [`SystemSource`] isolates every OS query the collector makes so that
//! failing lookups can be simulated in tests. Fallible lookups return their
//! error; the collector decides how to degrade.

use std::io;
use std::path::PathBuf;

use crate::build_info;
use crate::collectors::snapshot::models::BuildInfo;

/// Source of process identity, environment and build metadata
#[cfg_attr(test, mockall::automock)]
pub trait SystemSource: Send + Sync {
    fn pid(&self) -> u32;

    fn uid(&self) -> u32;

    fn gid(&self) -> u32;

    /// Environment as `KEY=VALUE` strings, in OS order
    fn environ(&self) -> Vec<String>;

    fn executable(&self) -> io::Result<PathBuf>;

    fn working_dir(&self) -> io::Result<PathBuf>;

    fn hostname(&self) -> io::Result<String>;

    /// `None` when the host never registered its build metadata
    fn build_info(&self) -> Option<BuildInfo>;
}

/// Source backed by the real operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSource;

impl SystemSource for OsSource {
    fn pid(&self) -> u32 {
        std::process::id()
    }

    fn uid(&self) -> u32 {
        #[cfg(unix)]
        {
            // SAFETY: getuid has no preconditions and cannot fail
            unsafe { libc::getuid() }
        }

        #[cfg(not(unix))]
        {
            0
        }
    }

    fn gid(&self) -> u32 {
        #[cfg(unix)]
        {
            // SAFETY: getgid has no preconditions and cannot fail
            unsafe { libc::getgid() }
        }

        #[cfg(not(unix))]
        {
            0
        }
    }

    fn environ(&self) -> Vec<String> {
        // vars_os never panics on non-UTF-8 entries, unlike vars
        std::env::vars_os()
            .map(|(key, value)| format!("{}={}", key.to_string_lossy(), value.to_string_lossy()))
            .collect()
    }

    fn executable(&self) -> io::Result<PathBuf> {
        std::env::current_exe()
    }

    fn working_dir(&self) -> io::Result<PathBuf> {
        std::env::current_dir()
    }

    fn hostname(&self) -> io::Result<String> {
        let name = hostname::get()?;
        name.into_string()
            .map_err(|raw| io::Error::new(io::ErrorKind::InvalidData, format!("hostname is not UTF-8: {:?}", raw)))
    }

    fn build_info(&self) -> Option<BuildInfo> {
        build_info::registered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_source_identity() {
        let source = OsSource;
        assert_eq!(source.pid(), std::process::id());

        #[cfg(unix)]
        {
            assert_eq!(source.uid(), unsafe { libc::getuid() });
            assert_eq!(source.gid(), unsafe { libc::getgid() });
        }
    }

    #[test]
    fn test_os_source_environ_format() {
        std::env::set_var("PROC_SNAPSHOT_SOURCE_TEST", "source-value");

        let environ = OsSource.environ();
        assert!(environ.iter().any(|e| e == "PROC_SNAPSHOT_SOURCE_TEST=source-value"));
        assert!(environ.iter().all(|e| e.contains('=')));

        std::env::remove_var("PROC_SNAPSHOT_SOURCE_TEST");
    }

    #[test]
    fn test_os_source_paths() {
        let source = OsSource;

        let exe = source.executable().unwrap();
        assert!(exe.is_absolute());

        let wd = source.working_dir().unwrap();
        assert!(wd.is_absolute());
    }

    #[test]
    fn test_os_source_hostname() {
        let hostname = OsSource.hostname().unwrap();
        assert!(!hostname.is_empty());
    }
}
