//! Point-in-time process snapshots

pub mod models;
mod collector;

pub use collector::Collector;

use models::Snapshot;

/// Take a snapshot of the current process with default settings.
///
/// Never fails: lookups that fail leave their field at its zero value.
pub fn collect() -> Snapshot {
    Collector::new().collect()
}
