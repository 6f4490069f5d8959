use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::boundary::BoundarySource;
use crate::common::fs::ensure_dir_exists;
use crate::io::checkpoint::{checkpoint_name, read_checkpoint, write_checkpoint};
use crate::io::csv::write_csv_gz;
use crate::raster::RasterSource;
use crate::schedule::{run_batch, BatchOptions, CancelToken};
use crate::table::CountTable;
use crate::tally::CellCount;
use crate::types::GeoType;

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Worker pool size; defaults to available parallelism minus one.
    pub threads: Option<usize>,
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Count,
    Prop,
}

impl TableKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TableKind::Count => "count",
            TableKind::Prop => "prop",
        }
    }
}

/// Output file name convention: `nlcd_<level>_<type>_<state>.csv.gz`.
pub fn output_name(level: GeoType, kind: TableKind, fips: &str) -> String {
    format!("nlcd_{}_{}_{fips}.csv.gz", level.level_name(), kind.as_str())
}

/// Run the full pipeline for one state: boundary setup, parallel tally,
/// checkpoint, merge/rollup, table writes.
///
/// Each phase returns a `Result` this function threads through; callers
/// decide whether a failed state aborts the run or is skipped. Per-block
/// failures never reach this level (the scheduler isolates them).
pub fn run_state<R, B>(
    raster: &R,
    boundaries: &B,
    fips: &str,
    out_dir: &Path,
    opts: &PipelineOptions,
    cancel: &CancelToken,
) -> Result<()>
where
    R: RasterSource + ?Sized,
    B: BoundarySource + ?Sized,
{
    ensure_dir_exists(out_dir)?;

    // Setup phase: boundary retrieval failure abandons the state.
    let blocks = boundaries
        .for_state(fips)
        .with_context(|| format!("boundary setup failed for state {fips}"))?;
    if blocks.is_empty() {
        bail!("no block boundaries for state {fips}");
    }
    if opts.verbose > 0 {
        eprintln!("[pipeline] state={fips}: {} blocks", blocks.len());
    }

    // Tally phase: one worker pool for this state, torn down on return.
    let batch = BatchOptions { threads: opts.threads, verbose: opts.verbose };
    let records = run_batch(raster, &blocks, &batch, cancel)?;

    // Durable checkpoint between the two stages; written even when the
    // batch tallied nothing, as the trace of what ran.
    write_checkpoint(&records, &out_dir.join(checkpoint_name(fips)))?;

    write_tables(&records, fips, out_dir, opts.verbose)
}

/// Merge records into the block table, roll up to block group and tract,
/// and write count + proportion tables for all three levels.
///
/// An empty record set (a state where nothing tallied) is a merge
/// failure: outputs are skipped and the error surfaces to the caller.
pub fn write_tables(records: &[CellCount], fips: &str, out_dir: &Path, verbose: u8) -> Result<()> {
    let blocks = CountTable::from_records(records)
        .with_context(|| format!("merge failed for state {fips}"))?;
    let groups = blocks.rollup(GeoType::Group)?;
    let tracts = blocks.rollup(GeoType::Tract)?;

    for table in [&blocks, &groups, &tracts] {
        let count_path = out_dir.join(output_name(table.level(), TableKind::Count, fips));
        write_csv_gz(&mut table.to_frame()?, &count_path)?;

        let prop_path = out_dir.join(output_name(table.level(), TableKind::Prop, fips));
        write_csv_gz(&mut table.proportions_frame()?, &prop_path)?;

        if verbose > 0 {
            eprintln!(
                "[pipeline] state={fips}: wrote {} rows at {} level",
                table.len(),
                table.level().level_name(),
            );
        }
    }

    Ok(())
}

/// The second batch job: rebuild and write all tables from a persisted
/// checkpoint, without touching the raster or boundaries.
pub fn rollup_checkpoint(checkpoint: &Path, out_dir: &Path, fips: &str, verbose: u8) -> Result<()> {
    let records = read_checkpoint(checkpoint)?;
    ensure_dir_exists(out_dir)?;
    write_tables(&records, fips, out_dir, verbose)
}

/// Process states strictly sequentially; a failed state is logged and
/// skipped, never aborting the run. Returns the fips codes that failed.
///
/// Each state gets its own `CancelToken`, so cancelling one batch mirrors
/// the error-skip behavior: the loop moves on to the next state.
pub fn run_states<R, B>(
    raster: &R,
    boundaries: &B,
    states: &[String],
    out_dir: &Path,
    opts: &PipelineOptions,
) -> Vec<String>
where
    R: RasterSource + ?Sized,
    B: BoundarySource + ?Sized,
{
    let mut failed = Vec::new();
    for fips in states {
        let cancel = CancelToken::new();
        match run_state(raster, boundaries, fips, out_dir, opts, &cancel) {
            Ok(()) => {
                if opts.verbose > 0 {
                    eprintln!("[pipeline] state={fips}: done");
                }
            }
            Err(err) => {
                eprintln!("[pipeline] state={fips} failed: {err:#}");
                failed.push(fips.clone());
            }
        }
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::BlockBoundary;
    use crate::raster::MemoryRaster;
    use crate::types::{GeoId, GeoType};
    use geo::{Coord, Rect};
    use ndarray::{array, Array2};
    use std::collections::HashMap;

    /// In-memory boundary collections keyed by state fips.
    struct VecBoundaries(HashMap<String, Vec<BlockBoundary>>);

    impl BoundarySource for VecBoundaries {
        fn for_state(&self, fips: &str) -> Result<Vec<BlockBoundary>> {
            self.0
                .get(fips)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no boundary download for state {fips}"))
        }
    }

    fn block(id: &str, min: (f64, f64), max: (f64, f64)) -> BlockBoundary {
        BlockBoundary {
            geo_id: GeoId::new(GeoType::Block, id),
            shape: Rect::new(Coord { x: min.0, y: min.1 }, Coord { x: max.0, y: max.1 })
                .to_polygon()
                .into(),
        }
    }

    fn raster() -> MemoryRaster {
        MemoryRaster::new(
            array![
                [11, 11, 41, 41],
                [11, 21, 41, 41],
                [90, 90, 82, 82],
                [90, 90, 82, 82],
            ],
            Coord { x: 0.0, y: 40.0 },
            10.0,
            0,
        )
        .unwrap()
    }

    fn boundaries() -> VecBoundaries {
        VecBoundaries(HashMap::from([(
            "31".to_string(),
            vec![
                block("310010001001001", (0.0, 20.0), (40.0, 40.0)),
                block("310010001001002", (0.0, 0.0), (40.0, 20.0)),
            ],
        )]))
    }

    #[test]
    fn state_pipeline_writes_all_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let opts = PipelineOptions { threads: Some(2), verbose: 0 };

        run_state(&raster(), &boundaries(), "31", dir.path(), &opts, &CancelToken::new())
            .unwrap();

        assert!(dir.path().join("state_31_block_counts.csv").exists());
        for level in ["block", "blockgroup", "tract"] {
            for kind in ["count", "prop"] {
                let name = format!("nlcd_{level}_{kind}_31.csv.gz");
                assert!(dir.path().join(&name).exists(), "missing {name}");
            }
        }
    }

    #[test]
    fn rollup_from_checkpoint_is_idempotent() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let opts = PipelineOptions { threads: Some(2), verbose: 0 };

        run_state(&raster(), &boundaries(), "31", first.path(), &opts, &CancelToken::new())
            .unwrap();

        let checkpoint = first.path().join(checkpoint_name("31"));
        rollup_checkpoint(&checkpoint, second.path(), "31", 0).unwrap();
        rollup_checkpoint(&checkpoint, second.path(), "31", 0).unwrap();

        for level in ["block", "blockgroup", "tract"] {
            for kind in ["count", "prop"] {
                let name = format!("nlcd_{level}_{kind}_31.csv.gz");
                assert_eq!(
                    std::fs::read(first.path().join(&name)).unwrap(),
                    std::fs::read(second.path().join(&name)).unwrap(),
                    "{name} differs between pipeline and checkpoint rollup",
                );
            }
        }
    }

    #[test]
    fn failed_state_is_skipped_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        let opts = PipelineOptions { threads: Some(1), verbose: 0 };

        let states = vec!["99".to_string(), "31".to_string()];
        let failed = run_states(&raster(), &boundaries(), &states, dir.path(), &opts);

        // State 99 has no boundaries; state 31 still completes.
        assert_eq!(failed, vec!["99".to_string()]);
        assert!(dir.path().join("nlcd_block_count_31.csv.gz").exists());
        assert!(!dir.path().join("nlcd_block_count_99.csv.gz").exists());
    }

    #[test]
    fn all_nodata_state_keeps_checkpoint_but_skips_tables() {
        let dir = tempfile::tempdir().unwrap();
        let opts = PipelineOptions { threads: Some(1), verbose: 0 };

        let nodata_raster = MemoryRaster::new(
            Array2::zeros((4, 4)),
            Coord { x: 0.0, y: 40.0 },
            10.0,
            0,
        )
        .unwrap();

        let result = run_state(
            &nodata_raster,
            &boundaries(),
            "31",
            dir.path(),
            &opts,
            &CancelToken::new(),
        );

        assert!(result.is_err());
        assert!(dir.path().join("state_31_block_counts.csv").exists());
        assert!(!dir.path().join("nlcd_block_count_31.csv.gz").exists());
    }

    #[test]
    fn output_names() {
        assert_eq!(output_name(GeoType::Block, TableKind::Count, "15"), "nlcd_block_count_15.csv.gz");
        assert_eq!(output_name(GeoType::Group, TableKind::Prop, "15"), "nlcd_blockgroup_prop_15.csv.gz");
        assert_eq!(output_name(GeoType::Tract, TableKind::Count, "15"), "nlcd_tract_count_15.csv.gz");
    }
}
