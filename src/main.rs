use anyhow::Result;
use clap::Parser;

use landtally::cli::{Cli, Commands};
use landtally::commands;

fn main() -> Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Commands::Rollup(args) => commands::rollup(&cli, args),
        Commands::Inspect(args) => commands::inspect(&cli, args),
    }
}
