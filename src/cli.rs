/// CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

// Build timestamp injected at compile time
pub const VERSION_WITH_BUILD: &str = concat!(env!("CARGO_PKG_VERSION"), " (built: ", env!("BUILD_TIMESTAMP"), ")");

#[derive(Parser)]
#[command(name = "groupapp-backup")]
#[command(author, version = VERSION_WITH_BUILD, about, long_about = None)]
pub struct Cli {
    /// Worker config file (defaults to ~/.config/groupapp-backup/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a backup task from a descriptor file
    Run {
        /// Task descriptor (JSON)
        #[arg(short, long)]
        task: PathBuf,

        /// Expected duration; exceeding it is only reported
        #[arg(long, default_value = "2h", value_parser = parse_duration)]
        timeout: Duration,
    },

    /// Classify a metadata file and summarize its content
    Inspect {
        /// Path to region_apps_metadata.json
        metadata: PathBuf,
    },

    /// Show the persisted status of a backup
    Status {
        backup_id: String,
    },
}

fn parse_duration(value: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(value)
}
