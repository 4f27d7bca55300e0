use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the proc-snapshot tool.
///
/// Global options control logging and configuration; the subcommand picks
/// the operation.
#[derive(Parser, Debug)]
#[clap(name = "proc-snapshot", about = "Process diagnostic snapshots", version)]
pub struct Args {
    /// Verbose logging
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Path to configuration YAML file
    #[clap(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Collect a snapshot of this process and print it as JSON
    Collect {
        /// Write the JSON to a file instead of stdout
        #[clap(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a full snapshot archive (record, stacks, heap image) of this process
    Full {
        /// Archive path, conventionally ending in .zip
        path: PathBuf,
    },

    /// List, hash and summarize an existing snapshot archive
    Inspect {
        /// Archive to inspect
        path: PathBuf,

        /// Print the summary as JSON
        #[clap(long)]
        json: bool,
    },

    /// Create a default configuration file
    InitConfig {
        /// Path where the configuration file will be created
        #[clap(default_value = "proc-snapshot.yaml")]
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_subcommand() {
        let args = Args::parse_from(["proc-snapshot", "collect"]);

        assert!(!args.verbose);
        assert!(args.config.is_none());
        match args.command {
            Commands::Collect { output } => assert!(output.is_none()),
            _ => panic!("Expected Collect command"),
        }
    }

    #[test]
    fn test_collect_with_output() {
        let args = Args::parse_from(["proc-snapshot", "collect", "--output", "/tmp/snap.json"]);

        match args.command {
            Commands::Collect { output } => {
                assert_eq!(output, Some(PathBuf::from("/tmp/snap.json")));
            }
            _ => panic!("Expected Collect command"),
        }
    }

    #[test]
    fn test_full_subcommand() {
        let args = Args::parse_from(["proc-snapshot", "full", "/tmp/out.zip"]);

        match args.command {
            Commands::Full { path } => assert_eq!(path, PathBuf::from("/tmp/out.zip")),
            _ => panic!("Expected Full command"),
        }
    }

    #[test]
    fn test_full_requires_path() {
        assert!(Args::try_parse_from(["proc-snapshot", "full"]).is_err());
    }

    #[test]
    fn test_inspect_subcommand() {
        let args = Args::parse_from(["proc-snapshot", "inspect", "out.zip", "--json"]);

        match args.command {
            Commands::Inspect { path, json } => {
                assert_eq!(path, PathBuf::from("out.zip"));
                assert!(json);
            }
            _ => panic!("Expected Inspect command"),
        }
    }

    #[test]
    fn test_init_config_default_path() {
        let args = Args::parse_from(["proc-snapshot", "init-config"]);

        match args.command {
            Commands::InitConfig { path } => {
                assert_eq!(path, PathBuf::from("proc-snapshot.yaml"));
            }
            _ => panic!("Expected InitConfig command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::parse_from([
            "proc-snapshot",
            "full", "/tmp/out.zip",
            "--verbose",
            "-c", "/etc/proc-snapshot.yaml",
        ]);

        assert!(args.verbose);
        assert_eq!(args.config, Some(PathBuf::from("/etc/proc-snapshot.yaml")));
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Args::try_parse_from(["proc-snapshot"]).is_err());
    }
}
