//! Process state collection.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Collector                  │
//! ├────────────────────┬────────────────────┤
//! │  RuntimeInspector  │    SystemSource    │
//! │  memory, threads,  │  pid, uid, env,    │
//! │  stacks, heap      │  exe, cwd, host    │
//! ├────────────────────┴────────────────────┤
//! │  /proc, mach, VirtualQuery, sysinfo     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! - [`runtime`]: memory statistics, thread enumeration, stack and heap dumps
//! - [`system`]: process identity, environment and build metadata lookups
//! - [`snapshot`]: the snapshot record and the collector that fills it

pub mod runtime;
pub mod snapshot;
pub mod system;
