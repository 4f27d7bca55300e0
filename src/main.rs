use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use proc_snapshot::archive::{inspect_archive, Archiver, ArchiveSummary};
use proc_snapshot::build_info;
use proc_snapshot::cli::{Args, Commands};
use proc_snapshot::collectors::snapshot::Collector;
use proc_snapshot::config::{load_or_default, SnapshotConfig};
use proc_snapshot::TrackingAllocator;

#[global_allocator]
static ALLOCATOR: TrackingAllocator = TrackingAllocator::new();

fn main() -> Result<()> {
    // Parse arguments
    let args = Args::parse();

    // Initialize logging
    initialize_logging(args.verbose)?;

    build_info::register(proc_snapshot::build_info!());

    match &args.command {
        Commands::Collect { output } => {
            let config = load_or_default(args.config.as_deref())?;
            collect_snapshot(&config, output.as_deref())
        }
        Commands::Full { path } => {
            let config = load_or_default(args.config.as_deref())?;
            write_full_snapshot(config, path)
        }
        Commands::Inspect { path, json } => inspect(path, *json),
        Commands::InitConfig { path } => {
            info!("Creating default configuration file at {}", path.display());
            SnapshotConfig::default().save_to_yaml_file(path)?;
            info!("Configuration created successfully");
            Ok(())
        }
    }
}

/// Initialize logging with the specified verbosity level
fn initialize_logging(verbose: bool) -> Result<()> {
    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ).context("Failed to initialize logger")?;
    Ok(())
}

/// Collect a snapshot and print it, or write it to `output`
fn collect_snapshot(config: &SnapshotConfig, output: Option<&Path>) -> Result<()> {
    let collection = Collector::from_config(config).collect_detailed();
    for diagnostic in &collection.diagnostics {
        info!("Field {} left empty: {}", diagnostic.field, diagnostic.error);
    }

    let json = serde_json::to_string_pretty(&collection.snapshot)
        .context("Failed to serialize snapshot")?;

    match output {
        Some(path) => {
            fs::write(path, format!("{}\n", json))
                .context(format!("Failed to write snapshot to {}", path.display()))?;
            info!("Snapshot written to {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", json).context("Failed to write snapshot to stdout")?;
        }
    }

    Ok(())
}

/// Write a full snapshot archive of this process
fn write_full_snapshot(config: SnapshotConfig, path: &Path) -> Result<()> {
    Archiver::from_config(config)
        .write_full_snapshot(path)
        .context(format!("Full snapshot to {} failed", path.display()))?;

    info!("Archive: {}", path.display());
    Ok(())
}

/// Print a listing of an existing archive
fn inspect(path: &Path, json: bool) -> Result<()> {
    let summary = inspect_archive(path)?;

    let mut stdout = io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut stdout, &summary)
            .context("Failed to serialize archive summary")?;
        writeln!(stdout)?;
    } else {
        print_summary(&mut stdout, &summary)?;
    }

    Ok(())
}

fn print_summary(out: &mut impl Write, summary: &ArchiveSummary) -> Result<()> {
    writeln!(out, "Archive: {}", summary.path)?;
    for entry in &summary.entries {
        writeln!(
            out,
            "  {:<14} {:>12} bytes ({:>12} compressed)  sha256:{}",
            entry.name, entry.size, entry.compressed_size, entry.sha256
        )?;
    }

    match &summary.snapshot {
        Some(snapshot) => {
            writeln!(out, "Snapshot:")?;
            writeln!(out, "  collected at: {}", snapshot.collected_at.to_rfc3339())?;
            writeln!(out, "  pid:          {}", snapshot.pid)?;
            writeln!(out, "  hostname:     {}", snapshot.hostname)?;
            writeln!(out, "  executable:   {}", snapshot.executable)?;
            writeln!(
                out,
                "  build:        {} {} ({})",
                snapshot.build_info.path, snapshot.build_info.version, snapshot.build_info.rust_version
            )?;
            writeln!(out, "  threads:      {}", snapshot.num_tasks)?;
            writeln!(out, "  resident:     {} bytes", snapshot.memory.resident_bytes)?;
        }
        None => writeln!(out, "Snapshot: missing or unreadable")?,
    }

    writeln!(
        out,
        "Complete: {}",
        if summary.is_complete() { "yes" } else { "no" }
    )?;
    Ok(())
}
