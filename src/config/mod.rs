mod env_vars;
mod snapshot_config;

// Re-export snapshot config
pub use snapshot_config::{
    SnapshotConfig,
    load_or_default,
};

// Re-export environment variable functions
pub use env_vars::{
    expand_env_vars,
    expand_unix_env_vars,
    expand_windows_env_vars,
};
