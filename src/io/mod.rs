//! Tabular I/O: CSV serialization and the per-state checkpoint format.

pub mod checkpoint;
pub(crate) mod csv;

pub use checkpoint::{read_checkpoint, write_checkpoint};
