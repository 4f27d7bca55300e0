use std::io;
use std::path::PathBuf;

use chrono::Utc;
use log::{debug, warn};

use crate::build_info;
use crate::collectors::runtime::{ProcessInspector, RuntimeInspector};
use crate::collectors::snapshot::models::{Collection, FieldDiagnostic, Snapshot};
use crate::collectors::system::{OsSource, SystemSource};
use crate::config::SnapshotConfig;
use crate::security::redact_environ;

/// Collector for point-in-time process snapshots.
///
/// Every field is read through one of two seams: a [`RuntimeInspector`] for
/// process-wide runtime state and a [`SystemSource`] for OS lookups. Lookups
/// that fail never abort collection; the field falls back to its zero value
/// and the failure is logged and recorded as a [`FieldDiagnostic`].
pub struct Collector {
    inspector: Box<dyn RuntimeInspector>,
    source: Box<dyn SystemSource>,
    redact_environment: bool,
}

impl Collector {
    /// Collector for the current process with default settings
    pub fn new() -> Self {
        Self::from_config(&SnapshotConfig::default())
    }

    /// Collector for the current process honoring `config`
    pub fn from_config(config: &SnapshotConfig) -> Self {
        Self {
            inspector: Box::new(ProcessInspector::with_heap_limit(config.max_heap_dump_bytes)),
            source: Box::new(OsSource),
            redact_environment: config.redact_environment,
        }
    }

    /// Collector over injected sources
    pub fn with_parts(inspector: Box<dyn RuntimeInspector>, source: Box<dyn SystemSource>) -> Self {
        Self {
            inspector,
            source,
            redact_environment: false,
        }
    }

    /// Mask credential-looking environment values in collected snapshots
    pub fn redact_environment(mut self, redact: bool) -> Self {
        self.redact_environment = redact;
        self
    }

    pub fn inspector(&self) -> &dyn RuntimeInspector {
        self.inspector.as_ref()
    }

    /// Take a snapshot. This cannot fail.
    pub fn collect(&self) -> Snapshot {
        let collection = self.collect_detailed();
        if !collection.diagnostics.is_empty() {
            debug!(
                "Snapshot collected with {} degraded field(s)",
                collection.diagnostics.len()
            );
        }
        collection.snapshot
    }

    /// Take a snapshot and report which fields fell back to zero values
    pub fn collect_detailed(&self) -> Collection {
        let mut diagnostics = Vec::new();

        let environ = self.source.environ();
        let environ = if self.redact_environment {
            redact_environ(&environ)
        } else {
            environ
        };

        let build_info = match self.source.build_info() {
            Some(info) => info,
            None => {
                diagnostics.push(FieldDiagnostic {
                    field: "buildInfo",
                    error: "no build metadata registered".to_string(),
                });
                build_info::compiler_only()
            }
        };

        let executable = path_or_default("executable", self.source.executable(), &mut diagnostics);
        let wd = path_or_default("wd", self.source.working_dir(), &mut diagnostics);
        let hostname = or_default("hostname", self.source.hostname(), &mut diagnostics);

        let snapshot = Snapshot {
            memory: self.inspector.memory_stats(),
            gc: self.inspector.gc_stats(),
            stack: self.inspector.current_stack(),
            build_info,
            num_tasks: self.inspector.task_count(),
            pid: self.source.pid(),
            uid: self.source.uid(),
            gid: self.source.gid(),
            environ,
            executable,
            wd,
            hostname,
            collected_at: Utc::now(),
        };

        Collection { snapshot, diagnostics }
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

fn or_default<T: Default>(field: &'static str, result: io::Result<T>, diagnostics: &mut Vec<FieldDiagnostic>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!("Could not resolve {} for snapshot: {}", field, e);
            diagnostics.push(FieldDiagnostic {
                field,
                error: e.to_string(),
            });
            T::default()
        }
    }
}

fn path_or_default(field: &'static str, result: io::Result<PathBuf>, diagnostics: &mut Vec<FieldDiagnostic>) -> String {
    or_default(field, result.map(|path| path.to_string_lossy().into_owned()), diagnostics)
}
