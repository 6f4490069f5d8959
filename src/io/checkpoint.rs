//! Durable long-format checkpoint between the tally stage and the
//! rollup stage: one (geoid, category, count) row per record, so the two
//! stages can run as separate batch jobs.

use std::path::Path;

use anyhow::{anyhow, bail, Result};
use polars::frame::DataFrame;
use polars::prelude::{DataType, NamedFrom};
use polars::series::Series;

use crate::io::csv::{read_csv, write_csv};
use crate::tally::CellCount;
use crate::types::{GeoId, GeoType};

/// Conventional checkpoint file name for one state.
pub fn checkpoint_name(fips: &str) -> String {
    format!("state_{fips}_block_counts.csv")
}

pub fn write_checkpoint(records: &[CellCount], path: &Path) -> Result<()> {
    let geoids: Vec<String> = records.iter().map(|r| r.geo_id.id().to_string()).collect();
    let categories: Vec<u32> = records.iter().map(|r| r.category as u32).collect();
    let counts: Vec<u64> = records.iter().map(|r| r.count).collect();

    let mut df = DataFrame::new(vec![
        Series::new("geoid".into(), geoids).into(),
        Series::new("category".into(), categories).into(),
        Series::new("count".into(), counts).into(),
    ])?;

    write_csv(&mut df, path)
}

pub fn read_checkpoint(path: &Path) -> Result<Vec<CellCount>> {
    let df = read_csv(path)?;

    let geoid = df.column("geoid")?.cast(&DataType::String)?;
    let geoid = geoid.str()?;
    let category = df.column("category")?.cast(&DataType::UInt32)?;
    let category = category.u32()?;
    let count = df.column("count")?.cast(&DataType::UInt64)?;
    let count = count.u64()?;

    let mut records = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let id = geoid.get(i).ok_or_else(|| anyhow!("missing geoid at row {i}"))?;
        let code = category.get(i).ok_or_else(|| anyhow!("missing category at row {i}"))?;
        if code > u8::MAX as u32 {
            bail!("category code {code} out of range at row {i}");
        }
        let n = count.get(i).ok_or_else(|| anyhow!("missing count at row {i}"))?;

        records.push(CellCount {
            geo_id: GeoId::new(GeoType::Block, id),
            category: code as u8,
            count: n,
        });
    }

    Ok(records)
}
