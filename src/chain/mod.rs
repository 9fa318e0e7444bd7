use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

pub mod column;
pub mod controller;
pub mod cursor;
pub mod cuts;
pub mod diagnostic;
pub mod fileset;
pub mod histogram;
pub mod schema;

pub use column::{ColumnBuffer, ColumnHandle};
pub use controller::{Chain, ChainConfig, ShardInfo};
pub use cursor::{CursorState, Record, RecordCursor};
pub use cuts::Cut;
pub use diagnostic::DiagnosticScan;
pub use fileset::FileSet;
pub use histogram::{
    FilteredHistogram, Histogram, HistogramAggregator, HistogramSnapshot, RangeSpec, count_rows,
};
pub use schema::SchemaBinder;

/// Error type used across the crate
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Shard not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Table `{table}` not found in shard {}", .path.display())]
    TableNotFound { path: PathBuf, table: String },

    #[error("Unknown column `{column}` in shard {}", .path.display())]
    UnknownColumn { column: String, path: PathBuf },

    #[error("Schema mismatch: shard {} does not provide column `{column}`", .path.display())]
    SchemaMismatch { column: String, path: PathBuf },

    #[error("Column `{column}` is {found}, expected {expected}")]
    KindMismatch {
        column: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("Global index {index} out of range (row count {row_count})")]
    IndexOutOfRange { index: usize, row_count: usize },

    #[error("Failed to load row {row} of shard {}: {reason}", .path.display())]
    RowLoad {
        path: PathBuf,
        row: usize,
        reason: String,
    },

    #[error("Schema/parse error: {0}")]
    Parse(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow2::error::Error),

    #[error("Invalid histogram: {0}")]
    InvalidHistogram(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, ChainError>;

/// Value kind of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int32,
    Int64,
    Float64,
    /// Variable-length sequence of `i32` per row
    SeqInt32,
    /// Variable-length sequence of `f64` per row
    SeqFloat64,
    /// Sequence of sequences of `f64` per row
    SeqSeqFloat64,
}

impl ValueKind {
    pub fn is_sequence(self) -> bool {
        matches!(
            self,
            ValueKind::SeqInt32 | ValueKind::SeqFloat64 | ValueKind::SeqSeqFloat64
        )
    }

    /// Short type tag, also accepted in CSV headers (`pixel_x:[i32]`)
    pub fn tag(self) -> &'static str {
        match self {
            ValueKind::Int32 => "i32",
            ValueKind::Int64 => "i64",
            ValueKind::Float64 => "f64",
            ValueKind::SeqInt32 => "[i32]",
            ValueKind::SeqFloat64 => "[f64]",
            ValueKind::SeqSeqFloat64 => "[[f64]]",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ValueKind {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "i32" => Ok(ValueKind::Int32),
            "i64" => Ok(ValueKind::Int64),
            "f64" => Ok(ValueKind::Float64),
            "[i32]" => Ok(ValueKind::SeqInt32),
            "[f64]" => Ok(ValueKind::SeqFloat64),
            "[[f64]]" => Ok(ValueKind::SeqSeqFloat64),
            other => Err(ChainError::Parse(format!("unknown value kind `{other}`"))),
        }
    }
}

/// A column a shard exposes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ValueKind,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Value helper for predicates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
}

impl Value {
    pub fn as_f64(self) -> f64 {
        match self {
            Value::Int(v) => v as f64,
            Value::Float(v) => v,
        }
    }
}

impl FromStr for Value {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(v) = s.parse::<i64>() {
            return Ok(Value::Int(v));
        }
        s.parse::<f64>()
            .map(Value::Float)
            .map_err(|e| ChainError::Parse(format!("invalid literal `{s}`: {e}")))
    }
}

/// Filter predicate over a scalar column
#[derive(Debug, Clone, PartialEq)]
pub enum FilterPredicate {
    Equals(Value),
    GreaterThan(Value),
    LessThan(Value),
    /// Inclusive on both ends
    Between(Value, Value),
}
