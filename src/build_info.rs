//! Build metadata registration
//!
//! A library cannot see the package metadata of the binary it is linked
//! into, so hosts register it once at startup:
//!
//! ```no_run
//! proc_snapshot::build_info::register(proc_snapshot::build_info!());
//! ```
//!
//! Compiler details are embedded by this crate's build script and are
//! reported even when nothing was registered.

use std::sync::OnceLock;

use crate::collectors::snapshot::models::{BuildInfo, Module};

static REGISTERED: OnceLock<BuildInfo> = OnceLock::new();

/// Output of `rustc --version` for the compiler that built this crate
pub const RUST_VERSION: &str = env!("PROC_SNAPSHOT_RUSTC_VERSION");

/// Target triple this crate was built for
pub const TARGET: &str = env!("PROC_SNAPSHOT_TARGET");

/// Cargo profile this crate was built with
pub const PROFILE: &str = env!("PROC_SNAPSHOT_PROFILE");

/// Build metadata for the calling package, read from its Cargo environment.
///
/// Dependencies can be listed as `"name" => "version"` pairs:
///
/// ```no_run
/// let info = proc_snapshot::build_info!("serde" => "1.0.200", "zip" => "0.6.6");
/// assert_eq!(info.deps.len(), 2);
/// ```
#[macro_export]
macro_rules! build_info {
    ($($dep:expr => $version:expr),* $(,)?) => {
        $crate::build_info::with_package(
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            vec![$(($dep, $version)),*],
        )
    };
}

/// Build metadata for a named package, completed with compiler details
pub fn with_package(path: &str, version: &str, deps: Vec<(&str, &str)>) -> BuildInfo {
    BuildInfo {
        path: path.to_string(),
        version: version.to_string(),
        deps: deps
            .into_iter()
            .map(|(path, version)| Module {
                path: path.to_string(),
                version: version.to_string(),
            })
            .collect(),
        ..compiler_only()
    }
}

/// Build metadata carrying only what the compiler knows
pub fn compiler_only() -> BuildInfo {
    BuildInfo {
        rust_version: RUST_VERSION.to_string(),
        target: TARGET.to_string(),
        profile: PROFILE.to_string(),
        ..Default::default()
    }
}

/// Register the host's build metadata. Returns false if metadata was already
/// registered; the first registration wins.
pub fn register(info: BuildInfo) -> bool {
    REGISTERED.set(info).is_ok()
}

/// The registered build metadata, if any
pub fn registered() -> Option<BuildInfo> {
    REGISTERED.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macro_reads_package_metadata() {
        let info = crate::build_info!("serde" => "1.0.0");

        assert_eq!(info.path, "proc-snapshot");
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(info.deps, vec![Module { path: "serde".to_string(), version: "1.0.0".to_string() }]);
        assert_eq!(info.target, TARGET);
    }

    #[test]
    fn test_compiler_only_has_no_package() {
        let info = compiler_only();

        assert!(info.path.is_empty());
        assert!(info.version.is_empty());
        assert!(info.deps.is_empty());
        assert_eq!(info.rust_version, RUST_VERSION);
    }

    #[test]
    fn test_first_registration_wins() {
        let first = with_package("host", "1.2.3", Vec::new());
        let second = with_package("other", "9.9.9", Vec::new());

        // Other tests never register, so this is the only writer
        assert!(register(first.clone()));
        assert!(!register(second));
        assert_eq!(registered(), Some(first));
    }
}
