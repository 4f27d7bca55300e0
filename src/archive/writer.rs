use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info};
use tempfile::{Builder, NamedTempFile};
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

use crate::collectors::runtime::RuntimeInspector;
use crate::collectors::snapshot::models::Snapshot;
use crate::collectors::snapshot::Collector;
use crate::config::SnapshotConfig;
use crate::constants::{ARCHIVE_FILE_MODE, HEAP_DUMP_TEMP_PREFIX, HEAP_ENTRY, SNAPSHOT_ENTRY, STACK_ENTRY};
use crate::error::{Result, SnapshotError};

/// Writes full snapshots: the snapshot record, an all-thread stack dump and
/// a heap image, packaged as one zip archive.
pub struct Archiver {
    collector: Collector,
    config: SnapshotConfig,
}

impl Archiver {
    /// Archiver for the current process with default settings
    pub fn new() -> Self {
        Self::from_config(SnapshotConfig::default())
    }

    /// Archiver for the current process honoring `config`. An out-of-range
    /// compression level is clamped into 0-9.
    pub fn from_config(config: SnapshotConfig) -> Self {
        let config = config.with_clamped_compression();
        Self {
            collector: Collector::from_config(&config),
            config,
        }
    }

    /// Archiver over an injected collector
    pub fn with_collector(collector: Collector, config: SnapshotConfig) -> Self {
        Self {
            collector,
            config: config.with_clamped_compression(),
        }
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Write a full snapshot archive to `path`, which should end in `.zip`.
    ///
    /// The archive holds `snapshot.json`, `stack.txt` and `heap.bin`, in
    /// that order.
    ///
    /// Warning: the heap image copies every resident heap page of the
    /// process. This takes time and disk space proportional to its heap and
    /// competes with the application for I/O while it runs. Schedule it for
    /// quiet periods and do not run several at once.
    ///
    /// On failure the error names the stage that failed. A truncated archive
    /// may remain at `path`; only the returned result indicates success.
    pub fn write_full_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let start = Instant::now();
        info!("Writing full snapshot to {}", path.display());

        let file = open_output(path).map_err(SnapshotError::Open)?;
        let mut zip = ZipWriter::new(file);

        let snapshot = self.collector.collect();
        let inspector = self.collector.inspector();

        write_snapshot_entry(&mut zip, &snapshot, self.entry_options())?;
        write_stack_entry(&mut zip, inspector, self.entry_options())?;
        write_heap_entry(
            &mut zip,
            inspector,
            self.entry_options().large_file(true),
            self.config.resolved_temp_dir(),
        )?;

        let file = zip.finish().map_err(SnapshotError::finalize)?;
        file.sync_all().map_err(SnapshotError::finalize)?;

        info!("Wrote full snapshot to {} in {:?}", path.display(), start.elapsed());
        Ok(())
    }

    fn entry_options(&self) -> FileOptions {
        FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(self.config.compression_level))
            .unix_permissions(ARCHIVE_FILE_MODE)
    }
}

impl Default for Archiver {
    fn default() -> Self {
        Self::new()
    }
}

/// Create or truncate the archive file; owner-only since it holds memory
/// contents
fn open_output(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(ARCHIVE_FILE_MODE);
    }

    options.open(path)
}

fn write_snapshot_entry<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    snapshot: &Snapshot,
    options: FileOptions,
) -> Result<()> {
    zip.start_file(SNAPSHOT_ENTRY, options)
        .map_err(SnapshotError::snapshot)?;

    serde_json::to_writer_pretty(&mut *zip, snapshot)
        .map_err(SnapshotError::snapshot)?;
    zip.write_all(b"\n").map_err(SnapshotError::snapshot)?;

    debug!("Wrote {}", SNAPSHOT_ENTRY);
    Ok(())
}

fn write_stack_entry<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    inspector: &dyn RuntimeInspector,
    options: FileOptions,
) -> Result<()> {
    zip.start_file(STACK_ENTRY, options)
        .map_err(SnapshotError::trace)?;

    inspector.stack_dump(&mut *zip).map_err(SnapshotError::trace)?;

    debug!("Wrote {}", STACK_ENTRY);
    Ok(())
}

fn create_dump_file(temp_dir: Option<&Path>) -> io::Result<NamedTempFile> {
    let mut builder = Builder::new();
    builder.prefix(HEAP_DUMP_TEMP_PREFIX);

    match temp_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
}

/// Dump the heap into a temp file, then copy it into the archive. The temp
/// file is removed when it goes out of scope, on every path.
fn write_heap_entry<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    inspector: &dyn RuntimeInspector,
    options: FileOptions,
    temp_dir: Option<PathBuf>,
) -> Result<()> {
    let mut dump = create_dump_file(temp_dir.as_deref()).map_err(SnapshotError::dump)?;
    debug!("Dumping heap to {}", dump.path().display());

    let heap_bytes = {
        let mut writer = BufWriter::new(dump.as_file_mut());
        let heap_bytes = inspector.heap_dump(&mut writer).map_err(SnapshotError::dump)?;
        writer.flush().map_err(SnapshotError::dump)?;
        heap_bytes
    };

    dump.seek(SeekFrom::Start(0)).map_err(SnapshotError::dump)?;

    zip.start_file(HEAP_ENTRY, options)
        .map_err(SnapshotError::dump)?;
    let written = io::copy(&mut dump, zip).map_err(SnapshotError::dump)?;

    dump.close().map_err(SnapshotError::dump)?;

    debug!("Wrote {} ({} heap bytes, {} bytes total)", HEAP_ENTRY, heap_bytes, written);
    Ok(())
}
