use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::env_vars::expand_env_vars;
use crate::constants::{DEFAULT_COMPRESSION_LEVEL, DEFAULT_MAX_HEAP_DUMP_BYTES, MAX_COMPRESSION_LEVEL};

/// Options for collecting and archiving snapshots
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Deflate level for archive entries (0-9)
    pub compression_level: i32,
    /// Directory for the temporary heap dump; `$VAR`/`${VAR}` (or `%VAR%` on
    /// Windows) are expanded. Defaults to the OS temp directory.
    pub temp_dir: Option<String>,
    /// Upper bound on heap bytes copied into `heap.bin`
    pub max_heap_dump_bytes: u64,
    /// Mask credential-looking values in the collected environment
    pub redact_environment: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            temp_dir: None,
            max_heap_dump_bytes: DEFAULT_MAX_HEAP_DUMP_BYTES,
            redact_environment: false,
        }
    }
}

impl SnapshotConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: SnapshotConfig = serde_yaml::from_str(&content)
            .context("Failed to parse YAML config")?;
        config.validate()?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_yaml_file(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)
            .context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .context(format!("Failed to write config to {}", path.display()))?;

        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Reject values the archive writer cannot honor
    pub fn validate(&self) -> Result<()> {
        if !(0..=MAX_COMPRESSION_LEVEL).contains(&self.compression_level) {
            bail!(
                "compression_level must be between 0 and {}, got {}",
                MAX_COMPRESSION_LEVEL,
                self.compression_level
            );
        }
        Ok(())
    }

    /// Bring an out-of-range compression level back into 0-9, logging the
    /// adjustment. Configs built in code skip YAML validation.
    pub fn with_clamped_compression(mut self) -> Self {
        let clamped = self.compression_level.clamp(0, MAX_COMPRESSION_LEVEL);
        if clamped != self.compression_level {
            warn!(
                "compression_level {} is outside 0-{}, using {}",
                self.compression_level, MAX_COMPRESSION_LEVEL, clamped
            );
            self.compression_level = clamped;
        }
        self
    }

    /// Temp directory with environment variables expanded
    pub fn resolved_temp_dir(&self) -> Option<PathBuf> {
        self.temp_dir
            .as_deref()
            .map(expand_env_vars)
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
    }
}

/// Load the configuration at `path`, or the defaults when no path is given
pub fn load_or_default(path: Option<&Path>) -> Result<SnapshotConfig> {
    match path {
        Some(path) => SnapshotConfig::from_yaml_file(path),
        None => {
            debug!("No config file given, using defaults");
            Ok(SnapshotConfig::default())
        }
    }
}
