mod dump;
mod info;
mod l1a;

use std::io::stderr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use spexone::telemetry::LEAP_SECONDS;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Log at debug level. SPX1_LOG, if set, takes precedence.
    #[arg(short, long, global = true, action)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a SPEXone Level-1A product from CCSDS packet files.
    ///
    /// Files are read in the order given and should be in temporal order. Files with a
    /// .H extension are CCSDS header files and are skipped.
    L1a {
        /// Issue of the TMTC handbook describing the science header format.
        ///
        /// Issues before 12 have no ICU time stamp after the MPS data (before 15-May-2020).
        #[arg(long, default_value_t = 12, value_name = "issue")]
        tmtc_issue: u8,

        /// TAI - UTC offset in seconds.
        #[arg(long, default_value_t = LEAP_SECONDS, value_name = "seconds")]
        leap_seconds: i64,

        /// Measurement identifier used to name on-ground products. Defaults to the name of
        /// the first input file without extension.
        #[arg(long, value_name = "id")]
        msm_id: Option<String>,

        /// Orbit revolution counter.
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        orbit: i64,

        /// Output product path, or directory to write a product with a generated name.
        #[arg(short, long, value_name = "path")]
        output: Option<PathBuf>,

        /// Replace the output product if it already exists
        #[arg(long, action)]
        clobber: bool,

        /// Input CCSDS packet files.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Show information about a spacepacket file
    Info {
        /// Input spacepacket file
        input: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: info::Format,

        /// TAI - UTC offset used to show packet times.
        #[arg(long, default_value_t = LEAP_SECONDS, value_name = "seconds")]
        leap_seconds: i64,
    },
    /// Show the dimensions, variables and attributes of a Level-1 product as JSON.
    Dump {
        /// Only show this group or variable, e.g., /science_data
        #[arg(short, long, value_name = "path")]
        target: Option<String>,

        /// Level-1 product
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("SPX1_LOG").unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::L1a {
            tmtc_issue,
            leap_seconds,
            msm_id,
            orbit,
            output,
            clobber,
            inputs,
        } => l1a::l1a(
            inputs,
            l1a::Args {
                tmtc_issue: *tmtc_issue,
                leap_seconds: *leap_seconds,
                msm_id: msm_id.clone(),
                orbit: *orbit,
                output: output.clone(),
                clobber: *clobber,
            },
        ),
        Commands::Info {
            input,
            format,
            leap_seconds,
        } => info::info(input, format, *leap_seconds),
        Commands::Dump { target, input } => dump::dump(input, target.as_deref()),
    }
}
