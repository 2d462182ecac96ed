// aedsync - keeps OpenStreetMap defibrillator nodes in step with the
// national AED registry

mod config;
mod exit_codes;
mod reconcile;
mod run_store;
mod sources;

use std::path::PathBuf;
use std::process::ExitCode;

use aedsync_recon::RunMode;
use clap::{Parser, Subcommand};

use exit_codes::EXIT_SUCCESS;
use reconcile::RunOptions;

#[derive(Parser)]
#[command(name = "aedsync")]
#[command(about = "Reconcile registry AEDs with OpenStreetMap")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan (and in live mode submit) one reconciliation run
    #[command(after_help = "\
Examples:
  aedsync run --config aedsync.toml
  aedsync run --config aedsync.toml --live
  aedsync run --config aedsync.toml --map-snapshot map.json --registry-snapshot assets.json
  RUST_LOG=debug aedsync run --config aedsync.toml --json > report.json")]
    Run {
        /// Path to the TOML config file
        #[arg(long, short = 'c', env = "AEDSYNC_CONFIG", default_value = "aedsync.toml")]
        config: PathBuf,

        /// Submit the plan as an OSM changeset (overrides `mode`)
        #[arg(long, conflicts_with = "dry_run")]
        live: bool,

        /// Only write review files (overrides `mode`)
        #[arg(long)]
        dry_run: bool,

        /// Read map elements from a saved Overpass response instead of querying
        #[arg(long)]
        map_snapshot: Option<PathBuf>,

        /// Read registry assets from a saved search response instead of the API
        #[arg(long)]
        registry_snapshot: Option<PathBuf>,

        /// Print the run report as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Write the run report JSON to a file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Check a config file and its boundary without running
    #[command(after_help = "\
Examples:
  aedsync validate --config aedsync.toml")]
    Validate {
        /// Path to the TOML config file
        #[arg(long, short = 'c', env = "AEDSYNC_CONFIG", default_value = "aedsync.toml")]
        config: PathBuf,
    },
}

/// Error carried to `main` and turned into an exit code.
#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            config,
            live,
            dry_run,
            map_snapshot,
            registry_snapshot,
            json,
            output,
        } => {
            let mode = match (live, dry_run) {
                (true, _) => Some(RunMode::Live),
                (_, true) => Some(RunMode::DryRun),
                _ => None,
            };
            reconcile::cmd_run(RunOptions {
                config,
                mode,
                map_snapshot,
                registry_snapshot,
                json,
                output,
            })
        }
        Commands::Validate { config } => reconcile::cmd_validate(&config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("error: {}", e.message);
            }
            if let Some(hint) = e.hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(e.code)
        }
    }
}
