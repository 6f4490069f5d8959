use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{bail, Result};
use polars::frame::DataFrame;
use polars::prelude::NamedFrom;
use polars::series::Series;

use crate::tally::CellCount;
use crate::types::GeoType;

/// Wide per-unit count table: one row per geographic unit, one column per
/// category observed anywhere in the state's records, zero-filled.
///
/// Rows and categories are kept in sorted order, so identical inputs
/// produce identical tables regardless of record arrival order.
#[derive(Debug, Clone)]
pub struct CountTable {
    level: GeoType,
    categories: Vec<u8>,        // sorted, shared column set for the state
    rows: BTreeMap<Arc<str>, Vec<u64>>, // geoid -> per-category counts
}

impl CountTable {
    /// Merge a state's cell-count records into a block-level wide table.
    ///
    /// Two passes: first collect the full sorted category set, then build
    /// fixed-width rows against that known column set. No two blocks in a
    /// state share a geoid, so concatenation order is irrelevant.
    pub fn from_records(records: &[CellCount]) -> Result<Self> {
        if records.is_empty() {
            bail!("no cell counts to merge");
        }

        let level = records[0].geo_id.ty;
        if records.iter().any(|r| r.geo_id.ty != level) {
            bail!("mixed geographic levels in cell counts");
        }

        let categories: Vec<u8> = records
            .iter()
            .map(|r| r.category)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let column: BTreeMap<u8, usize> =
            categories.iter().enumerate().map(|(i, &code)| (code, i)).collect();

        let mut rows: BTreeMap<Arc<str>, Vec<u64>> = BTreeMap::new();
        for record in records {
            let row = rows
                .entry(record.geo_id.id.clone())
                .or_insert_with(|| vec![0; categories.len()]);
            row[column[&record.category]] += record.count;
        }

        Ok(Self { level, categories, rows })
    }

    #[inline] pub fn level(&self) -> GeoType { self.level }

    #[inline] pub fn len(&self) -> usize { self.rows.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    #[inline] pub fn categories(&self) -> &[u8] { &self.categories }

    /// Per-category counts for one unit, in `categories()` order.
    pub fn counts(&self, geoid: &str) -> Option<&[u64]> {
        self.rows.get(geoid).map(|row| row.as_slice())
    }

    /// Total cell count for one unit.
    pub fn total(&self, geoid: &str) -> Option<u64> {
        self.rows.get(geoid).map(|row| row.iter().sum())
    }

    /// Aggregate rows into a coarser level by GEOID prefix, summing all
    /// category columns elementwise. Plain integer addition keeps the
    /// result independent of row order.
    pub fn rollup(&self, level: GeoType) -> Result<CountTable> {
        if level.prefix_len() >= self.level.prefix_len() {
            bail!(
                "cannot roll {} rows up to {}",
                self.level.level_name(),
                level.level_name(),
            );
        }

        let len = level.prefix_len();
        let mut rows: BTreeMap<Arc<str>, Vec<u64>> = BTreeMap::new();
        for (geoid, counts) in &self.rows {
            let prefix: Arc<str> = Arc::from(&geoid[..geoid.len().min(len)]);
            let row = rows.entry(prefix).or_insert_with(|| vec![0; self.categories.len()]);
            for (acc, &count) in row.iter_mut().zip(counts) {
                *acc += count;
            }
        }

        Ok(CountTable { level, categories: self.categories.clone(), rows })
    }

    /// Materialize as a DataFrame: geoid, count_<code>..., count_total.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let mut columns = Vec::with_capacity(self.categories.len() + 2);

        let geoids: Vec<String> = self.rows.keys().map(|k| k.to_string()).collect();
        columns.push(Series::new("geoid".into(), geoids).into());

        for (i, code) in self.categories.iter().enumerate() {
            let counts: Vec<u64> = self.rows.values().map(|row| row[i]).collect();
            columns.push(Series::new(format!("count_{code}").into(), counts).into());
        }

        let totals: Vec<u64> = self.rows.values().map(|row| row.iter().sum()).collect();
        columns.push(Series::new("count_total".into(), totals).into());

        Ok(DataFrame::new(columns)?)
    }

    /// Derived proportion table: geoid, prop_<code>... where each value is
    /// count / count_total rounded to 4 decimals. Rows with a zero total
    /// get all-zero proportions, never NaN.
    pub fn proportions_frame(&self) -> Result<DataFrame> {
        let mut columns = Vec::with_capacity(self.categories.len() + 1);

        let geoids: Vec<String> = self.rows.keys().map(|k| k.to_string()).collect();
        columns.push(Series::new("geoid".into(), geoids).into());

        let totals: Vec<u64> = self.rows.values().map(|row| row.iter().sum()).collect();
        for (i, code) in self.categories.iter().enumerate() {
            let props: Vec<f64> = self
                .rows
                .values()
                .zip(&totals)
                .map(|(row, &total)| {
                    if total == 0 {
                        0.0
                    } else {
                        round4(row[i] as f64 / total as f64)
                    }
                })
                .collect();
            columns.push(Series::new(format!("prop_{code}").into(), props).into());
        }

        Ok(DataFrame::new(columns)?)
    }
}

#[inline]
fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoId;

    fn record(id: &str, category: u8, count: u64) -> CellCount {
        CellCount { geo_id: GeoId::new(GeoType::Block, id), category, count }
    }

    fn sample_records() -> Vec<CellCount> {
        vec![
            record("310010001001001", 11, 2),
            record("310010001001001", 41, 3),
            record("310010001001002", 41, 5),
            record("310010001002001", 90, 4),
        ]
    }

    #[test]
    fn wide_table_zero_fills_missing_categories() {
        let table = CountTable::from_records(&sample_records()).unwrap();

        assert_eq!(table.categories(), &[11, 41, 90]);
        assert_eq!(table.counts("310010001001001"), Some(&[2, 3, 0][..]));
        assert_eq!(table.counts("310010001001002"), Some(&[0, 5, 0][..]));
        assert_eq!(table.counts("310010001002001"), Some(&[0, 0, 4][..]));
        assert_eq!(table.total("310010001001001"), Some(5));
    }

    #[test]
    fn merge_is_order_independent() {
        let mut reversed = sample_records();
        reversed.reverse();

        let a = CountTable::from_records(&sample_records()).unwrap();
        let b = CountTable::from_records(&reversed).unwrap();
        assert_eq!(a.to_frame().unwrap(), b.to_frame().unwrap());
    }

    #[test]
    fn empty_records_are_an_error() {
        assert!(CountTable::from_records(&[]).is_err());
    }

    #[test]
    fn rollup_sums_by_prefix() {
        let table = CountTable::from_records(&sample_records()).unwrap();

        let groups = table.rollup(GeoType::Group).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups.counts("310010001001"), Some(&[2, 8, 0][..]));
        assert_eq!(groups.counts("310010001002"), Some(&[0, 0, 4][..]));

        let tracts = table.rollup(GeoType::Tract).unwrap();
        assert_eq!(tracts.len(), 1);
        assert_eq!(tracts.counts("31001000100"), Some(&[2, 8, 4][..]));
    }

    #[test]
    fn rollup_preserves_sums() {
        let table = CountTable::from_records(&sample_records()).unwrap();
        let block_total: u64 = sample_records().iter().map(|r| r.count).sum();

        for level in [GeoType::Group, GeoType::Tract, GeoType::State] {
            let rolled = table.rollup(level).unwrap();
            let rolled_total: u64 = rolled
                .rows
                .values()
                .map(|row| row.iter().sum::<u64>())
                .sum();
            assert_eq!(rolled_total, block_total);
        }
    }

    #[test]
    fn rollup_to_finer_level_is_an_error() {
        let table = CountTable::from_records(&sample_records()).unwrap();
        let tracts = table.rollup(GeoType::Tract).unwrap();
        assert!(tracts.rollup(GeoType::Block).is_err());
        assert!(tracts.rollup(GeoType::Tract).is_err());
    }

    #[test]
    fn frame_has_total_column() {
        let table = CountTable::from_records(&sample_records()).unwrap();
        let df = table.to_frame().unwrap();

        assert_eq!(
            df.get_column_names_str(),
            vec!["geoid", "count_11", "count_41", "count_90", "count_total"],
        );
        let totals = df.column("count_total").unwrap().u64().unwrap();
        assert_eq!(totals.get(0), Some(5));
        assert_eq!(totals.get(1), Some(5));
        assert_eq!(totals.get(2), Some(4));
    }

    #[test]
    fn proportions_scenario() {
        // Cells [11, 11, 41, 41, 41] inside one block.
        let records = vec![record("310010001001001", 11, 2), record("310010001001001", 41, 3)];
        let table = CountTable::from_records(&records).unwrap();
        let df = table.proportions_frame().unwrap();

        assert_eq!(df.column("prop_11").unwrap().f64().unwrap().get(0), Some(0.4));
        assert_eq!(df.column("prop_41").unwrap().f64().unwrap().get(0), Some(0.6));
    }

    #[test]
    fn proportions_round_to_four_decimals() {
        let records = vec![record("310010001001001", 11, 1), record("310010001001001", 41, 2)];
        let table = CountTable::from_records(&records).unwrap();
        let df = table.proportions_frame().unwrap();

        assert_eq!(df.column("prop_11").unwrap().f64().unwrap().get(0), Some(0.3333));
        assert_eq!(df.column("prop_41").unwrap().f64().unwrap().get(0), Some(0.6667));
    }

    #[test]
    fn proportions_sum_within_tolerance() {
        let records = vec![
            record("310010001001001", 11, 1),
            record("310010001001001", 41, 1),
            record("310010001001001", 90, 1),
        ];
        let table = CountTable::from_records(&records).unwrap();
        let df = table.proportions_frame().unwrap();

        let sum: f64 = ["prop_11", "prop_41", "prop_90"]
            .iter()
            .map(|name| df.column(name).unwrap().f64().unwrap().get(0).unwrap())
            .sum();
        assert!((sum - 1.0).abs() <= 0.0001 * 3.0);
    }

    #[test]
    fn zero_total_rows_get_zero_proportions() {
        // A zero count can enter through explicit zero records.
        let records = vec![record("310010001001001", 11, 0), record("310010001001002", 11, 7)];
        let table = CountTable::from_records(&records).unwrap();
        let df = table.proportions_frame().unwrap();

        let props = df.column("prop_11").unwrap().f64().unwrap();
        assert_eq!(props.get(0), Some(0.0));
        assert_eq!(props.get(1), Some(1.0));
    }
}
