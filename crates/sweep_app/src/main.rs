//! `sweep`: operator control surface for batched listing sweeps.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use sweep_logging::{sweep_error, LogDestination, DEFAULT_LOG_FILE};

mod commands;
mod preferences;

use commands::{cmd_address, cmd_clear, cmd_count, cmd_export, cmd_start, cmd_status, AppError};

#[derive(Parser)]
#[command(name = "sweep")]
#[command(about = "Visit every detail page linked from a listing and collect one record per page")]
#[command(after_help = "\
TYPICAL SESSION:
  sweep address --month 5 --year 2024   # Print the listing address for May 2024
  sweep count <listing-url>             # How many detail links are on the listing
  sweep start <listing-url>             # Run and wait until it settles
  sweep export --out ./exports          # Write records-YYYY-MM-DD.json")]
struct Cli {
    /// Directory holding run state, records and preferences
    #[arg(long, global = true, default_value = ".sweep")]
    data_dir: PathBuf,
    /// Where log output goes
    #[arg(long, global = true, value_enum, default_value_t = LogTarget::File)]
    log: LogTarget,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogTarget {
    File,
    Terminal,
    Both,
}

#[derive(Subcommand)]
enum Commands {
    /// Count the detail links on a listing page
    Count {
        /// Listing page address
        listing: String,
    },
    /// Start a run from a listing page and follow it until it settles
    Start {
        /// Listing page address
        listing: String,
        /// Contexts opened per batch (1-20); defaults to the last value used
        #[arg(short, long)]
        batch_size: Option<usize>,
    },
    /// Show the current run
    Status,
    /// Write all collected records to a dated JSON file
    Export {
        /// Target directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
        /// File name prefix
        #[arg(short, long, default_value = sweep_engine::DEFAULT_EXPORT_PREFIX)]
        prefix: String,
    },
    /// Erase run state and collected records
    Clear,
    /// Print the listing address for a calendar month
    Address {
        /// Month (1-12); defaults to the last value used, then the current month
        #[arg(short, long)]
        month: Option<u32>,
        /// Year; defaults to the last value used, then the current year
        #[arg(short, long)]
        year: Option<i32>,
        /// Listing base address
        #[arg(long)]
        base: Option<String>,
    },
}

fn log_destination(target: LogTarget) -> LogDestination {
    match target {
        LogTarget::File => LogDestination::File(PathBuf::from(DEFAULT_LOG_FILE)),
        LogTarget::Terminal => LogDestination::Terminal,
        LogTarget::Both => LogDestination::Both(PathBuf::from(DEFAULT_LOG_FILE)),
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let data_dir = cli.data_dir;
    match cli.command {
        Commands::Count { listing } => cmd_count(&data_dir, &listing).await,
        Commands::Start { listing, batch_size } => cmd_start(&data_dir, &listing, batch_size).await,
        Commands::Status => cmd_status(&data_dir).await,
        Commands::Export { out, prefix } => cmd_export(&data_dir, &out, prefix),
        Commands::Clear => cmd_clear(&data_dir).await,
        Commands::Address { month, year, base } => cmd_address(&data_dir, month, year, base),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    sweep_logging::initialize(log_destination(cli.log), level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            sweep_error!("{}", err);
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
