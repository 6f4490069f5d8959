#![doc = "Land-cover tabulation public API"]
mod boundary;
mod common;
mod io;
mod pipeline;
mod raster;
mod schedule;
mod table;
mod tally;
mod types;

pub mod cli;
pub mod commands;

#[doc(inline)]
pub use boundary::{read_block_shapefile, BlockBoundary, BoundarySource, ShapefileBoundaries};

#[doc(inline)]
pub use io::checkpoint::{checkpoint_name, read_checkpoint, write_checkpoint};

#[doc(inline)]
pub use pipeline::{
    output_name, rollup_checkpoint, run_state, run_states, write_tables, PipelineOptions,
    TableKind,
};

#[doc(inline)]
pub use raster::{MemoryRaster, RasterSource, RasterWindow};

#[doc(inline)]
pub use schedule::{run_batch, BatchOptions, CancelToken};

#[doc(inline)]
pub use table::CountTable;

#[doc(inline)]
pub use tally::{tally_block, tally_shape, CellCount};

#[doc(inline)]
pub use types::{nlcd_label, GeoId, GeoType};
