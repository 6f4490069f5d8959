use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;

use crate::cli::{Cli, InspectArgs, RollupArgs};
use crate::io::checkpoint::read_checkpoint;
use crate::pipeline;
use crate::types::nlcd_label;

pub fn rollup(cli: &Cli, args: &RollupArgs) -> Result<()> {
    if cli.verbose > 0 {
        eprintln!("[rollup] {} -> {}", args.checkpoint.display(), args.out.display());
    }

    pipeline::rollup_checkpoint(&args.checkpoint, &args.out, &args.state, cli.verbose)?;

    println!("Wrote tables for state {} into {}", args.state, args.out.display());
    Ok(())
}

pub fn inspect(_cli: &Cli, args: &InspectArgs) -> Result<()> {
    let records = read_checkpoint(&args.checkpoint)?;

    let blocks: BTreeSet<&str> = records.iter().map(|r| r.geo_id.id()).collect();
    let mut totals: BTreeMap<u8, u64> = BTreeMap::new();
    for record in &records {
        *totals.entry(record.category).or_insert(0) += record.count;
    }

    println!("Number of records: {}", records.len());
    println!("Number of blocks: {}", blocks.len());
    println!("Category totals:");
    for (code, count) in totals {
        let label = nlcd_label(code).unwrap_or("unknown");
        println!("  - {code} ({label}): {count}");
    }

    Ok(())
}
