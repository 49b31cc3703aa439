//! # histstore
//!
//! Histogram containers mapped onto a detector-cell grid.
//!
//! ## Pieces
//! - HGRID container format: nom parser, writer, memory-mapped reader
//! - Coordinate parsing from histogram names
//! - Grid indexing (by name, positional fallback in a declared scan order)
//! - Per-histogram summary statistics

#![warn(missing_docs)]

mod container;
mod error;
mod histogram;
mod index;
mod naming;
mod parser;
mod stats;
mod writer;

pub use container::HistFile;
pub use error::{Error, Result};
pub use histogram::Histogram;
pub use index::{
    build_index, index_by_name, index_by_position, index_keys, Cell, CellIndex, GridSpec,
    IndexStrategy, ScanOrder,
};
pub use naming::{display_name, extract_cell};
pub use parser::{Codec, ContainerHeader, EntryKind, EntryRecord, FORMAT_VERSION, HGRID_MAGIC};
pub use stats::HistStats;
pub use writer::ContainerWriter;
