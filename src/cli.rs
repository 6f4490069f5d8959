use clap::{Args, Parser, Subcommand, ValueHint};
use std::path::PathBuf;

/// Land-cover tabulation CLI (argument schema only)
#[derive(Parser, Debug)]
#[command(name = "landtally", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rebuild count/proportion tables from a per-state checkpoint
    Rollup(RollupArgs),

    /// Summarize a per-state checkpoint
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
pub struct RollupArgs {
    /// Long-format block counts checkpoint (state_<fips>_block_counts.csv)
    #[arg(value_hint = ValueHint::FilePath)]
    pub checkpoint: PathBuf,

    /// Output directory for the .csv.gz tables
    #[arg(value_hint = ValueHint::DirPath)]
    pub out: PathBuf,

    /// Two-digit state FIPS code used in output file names
    #[arg(long)]
    pub state: String,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Long-format block counts checkpoint to summarize
    #[arg(value_hint = ValueHint::FilePath)]
    pub checkpoint: PathBuf,
}
