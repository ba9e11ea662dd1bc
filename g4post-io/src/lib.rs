//! g4post-io: packed event files and per-file execution.
//!
//! Input and output files share one packed layout: every column of ragged
//! values is stored as offset buffers plus a flat data buffer. This crate
//! reads such files through memory maps, splits them into batches, runs a
//! [`g4post_pipeline::Pipeline`] over each batch on a rayon worker pool and
//! writes the configured output variables back in the same layout.

mod error;
#[cfg(feature = "hdf5")]
pub mod hdf5;
pub mod out_of_core;
mod packed;
mod reader;
mod runner;
mod writer;

pub use error::{Error, Result};
pub use out_of_core::{estimate_row_bytes, BatchSizing};
pub use packed::{Buffers, PackedColumn, PackedTable, Table};
pub use reader::{read_packed, read_table, Batch, Batches, Container, EventFile, MappedFileReader};
pub use runner::{FileOutcome, FileStatus, NoProgress, Progress, RunReport, Runner};
pub use writer::{write_packed, write_table};
