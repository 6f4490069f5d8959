use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use rayon::prelude::*;

use crate::boundary::BlockBoundary;
use crate::raster::RasterSource;
use crate::tally::{tally_block, CellCount};

/// External cancellation signal for a running batch. Outstanding units
/// observe it at their next pull and are skipped; the batch then returns
/// an error so the caller can move on to the next state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self { Self::default() }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Worker pool size; defaults to available parallelism minus one.
    pub threads: Option<usize>,
    pub verbose: u8,
}

fn pool_size(requested: Option<usize>) -> usize {
    requested
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2)
                .saturating_sub(1)
        })
        .max(1)
}

/// Completion counter with advisory ETA output at units 10 and 100 and
/// at every 10% boundary.
struct Progress {
    started: Instant,
    done: AtomicUsize,
    total: usize,
    verbose: u8,
}

impl Progress {
    fn new(total: usize, verbose: u8) -> Self {
        Self { started: Instant::now(), done: AtomicUsize::new(0), total, verbose }
    }

    fn checkpoint(done: usize, total: usize) -> bool {
        if done == 10 || done == 100 {
            return true;
        }
        // Crossed a 10% boundary with this unit?
        total > 0 && (done * 10 / total) > ((done - 1) * 10 / total)
    }

    fn record(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if self.verbose == 0 || !Self::checkpoint(done, self.total) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let remaining = self.total - done;
        let eta = elapsed / done as f64 * remaining as f64;
        eprintln!(
            "[schedule] {done}/{} blocks ({}%), eta {eta:.0}s",
            self.total,
            done * 100 / self.total.max(1),
        );
    }

    fn completed(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }
}

/// Run the per-block tally over a state's boundary collection on a
/// fixed-size worker pool.
///
/// Workers pull blocks load-balanced (per-block cost varies with polygon
/// size), receive only shared immutable references, and return values;
/// the coordinator alone assembles the result collection. A failing
/// block is logged and contributes an empty record set; it never aborts
/// its siblings. The pool is torn down when this returns, success or
/// not, so no workers leak across states.
pub fn run_batch<R: RasterSource + ?Sized>(
    raster: &R,
    blocks: &[BlockBoundary],
    opts: &BatchOptions,
    cancel: &CancelToken,
) -> Result<Vec<CellCount>> {
    let threads = pool_size(opts.threads);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("failed to build worker pool")?;

    if opts.verbose > 0 {
        eprintln!("[schedule] {} blocks on {} workers", blocks.len(), threads);
    }

    let progress = Progress::new(blocks.len(), opts.verbose);
    let results: Vec<Vec<CellCount>> = pool.install(|| {
        blocks
            .par_iter()
            .map(|block| {
                if cancel.is_cancelled() {
                    return Vec::new();
                }
                let records = match tally_block(raster, &block.geo_id, &block.shape) {
                    Ok(records) => records,
                    Err(err) => {
                        eprintln!("[schedule] block {} failed: {err:#}", block.geo_id.id());
                        Vec::new()
                    }
                };
                progress.record();
                records
            })
            .collect()
    });
    drop(pool);

    if cancel.is_cancelled() {
        bail!(
            "batch cancelled after {} of {} blocks",
            progress.completed(),
            blocks.len(),
        );
    }

    Ok(results.into_iter().flatten().collect())
}
