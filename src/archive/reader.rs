use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::Serialize;
use zip::ZipArchive;

use crate::collectors::snapshot::models::Snapshot;
use crate::constants::{ARCHIVE_ENTRIES, SNAPSHOT_ENTRY};
use crate::utils::hash::sha256_reader;

/// One entry of a snapshot archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySummary {
    pub name: String,
    /// Uncompressed size in bytes
    pub size: u64,
    pub compressed_size: u64,
    pub sha256: String,
}

/// Contents of a snapshot archive
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveSummary {
    pub path: String,
    /// Entries in archive order
    pub entries: Vec<EntrySummary>,
    /// The parsed `snapshot.json`, if present and well-formed
    pub snapshot: Option<Snapshot>,
}

impl ArchiveSummary {
    /// True when the archive holds exactly the three snapshot entries, in
    /// order, none empty, and the record parsed
    pub fn is_complete(&self) -> bool {
        let names: Vec<&str> = self.entries.iter().map(|e| e.name.as_str()).collect();
        names == ARCHIVE_ENTRIES
            && self.entries.iter().all(|e| e.size > 0)
            && self.snapshot.is_some()
    }

    pub fn entry(&self, name: &str) -> Option<&EntrySummary> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// List and hash every entry of the archive at `path`, and parse its
/// snapshot record
pub fn inspect_archive(path: &Path) -> Result<ArchiveSummary> {
    let file = File::open(path)
        .context(format!("Failed to open archive: {}", path.display()))?;
    let mut archive = ZipArchive::new(file)
        .context(format!("Not a zip archive: {}", path.display()))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .context(format!("Failed to read entry {} of {}", i, path.display()))?;
        let name = entry.name().to_string();
        let size = entry.size();
        let compressed_size = entry.compressed_size();

        let (sha256, hashed) = sha256_reader(entry)
            .context(format!("Failed to decompress entry {}", name))?;
        if hashed != size {
            warn!("Entry {} declares {} bytes but holds {}", name, size, hashed);
        }

        debug!("Entry {} ({} bytes, sha256 {})", name, size, sha256);
        entries.push(EntrySummary {
            name,
            size,
            compressed_size,
            sha256,
        });
    }

    let snapshot = match parse_snapshot_entry(&mut archive) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!("{}: {:#}", path.display(), e);
            None
        }
    };

    Ok(ArchiveSummary {
        path: path.display().to_string(),
        entries,
        snapshot,
    })
}

/// Parse the snapshot record out of the archive at `path`
pub fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let file = File::open(path)
        .context(format!("Failed to open archive: {}", path.display()))?;
    let mut archive = ZipArchive::new(file)
        .context(format!("Not a zip archive: {}", path.display()))?;

    parse_snapshot_entry(&mut archive)
}

fn parse_snapshot_entry(archive: &mut ZipArchive<File>) -> Result<Snapshot> {
    let entry = archive
        .by_name(SNAPSHOT_ENTRY)
        .context(format!("Archive has no {}", SNAPSHOT_ENTRY))?;

    serde_json::from_reader(entry).context(format!("Failed to parse {}", SNAPSHOT_ENTRY))
}
