//! Utility functions shared by the archive reader and the CLI.
//!
//! ### Hashing an archive
//!
//! ```no_run
//! use proc_snapshot::utils::hash::calculate_sha256;
//! use std::path::Path;
//!
//! # fn example() -> std::io::Result<()> {
//! let digest = calculate_sha256(Path::new("/tmp/snapshot.zip"))?;
//! println!("SHA-256: {}", digest);
//! # Ok(())
//! # }
//! ```

/// Cryptographic hash calculation utilities
pub mod hash;
