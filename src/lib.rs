//! # ShardChain
//!
//! `ShardChain` presents an ordered list of shard files as one logical table and
//! streams its rows through typed, chain-owned column buffers. It supports:
//!
//! - Chaining shards with O(log n) global-to-local row mapping
//! - Lazy column binding, re-resolved on every shard transition
//! - A bounded cache of open shard tables (closed on drop)
//! - Streaming 1D histograms with cuts over scalar and sequence columns
//! - Periodic diagnostic dumps of selected columns
//! - Memory-mapped CSV shards parsed in parallel with Rayon, and Arrow IPC shards
//!
//! # Example
//!
//! ```rust,no_run
//! use shard_chain::{ChainConfig, CsvStore, Cut, FileSet, HistogramAggregator};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let files = FileSet::discover("data", "csv")?;
//!     let mut chain = files.build(CsvStore, ChainConfig::default())?;
//!     println!("Total rows: {}", chain.row_count());
//!
//!     let histogram = HistogramAggregator::fixed(100, 0.0, 5.0)
//!         .with_cut("pixel_count>3".parse::<Cut>()?)
//!         .drain_chain(&mut chain, "energy_deposit")?;
//!     for (lo, hi, count) in histogram.bins() {
//!         println!("[{lo}, {hi}) {count}");
//!     }
//!
//!     Ok(())
//! }
//! ```

mod helpers;
pub mod chain;
pub mod store;

pub use chain::{
    Chain, ChainConfig, ChainError, ColumnBuffer, ColumnHandle, ColumnSpec, Cut, DiagnosticScan,
    FileSet, FilterPredicate, FilteredHistogram, Histogram, HistogramAggregator,
    HistogramSnapshot, RangeSpec, Record, RecordCursor, Result, Value, ValueKind, count_rows,
};
pub use store::{CsvStore, IpcStore, MemoryStore, ShardFormat, ShardStore, ShardTable};
