//! Security utilities.
//!
//! Snapshots capture secrets by nature: the environment, and with a full
//! snapshot the raw heap. This module provides credential scrubbing for the
//! environment; archives are written with owner-only permissions.

pub mod credential_scrubber;

pub use credential_scrubber::{redact_environ, redact_environ_entry, scrub_credentials};
