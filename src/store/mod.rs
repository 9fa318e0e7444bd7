//! Shard store adapters.
//!
//! A [`ShardStore`] opens one physical file and resolves a table in it. The
//! resulting [`ShardTable`] reports its row count and schema, resolves named
//! columns into [`ColumnSlot`]s and copies one row of the bound columns into
//! chain-owned [`ColumnBuffer`]s. Dropping a table closes it.

use std::path::Path;

use crate::chain::{ChainError, ColumnBuffer, ColumnSpec, Result, ValueKind};

pub mod column_data;
pub mod csv;
pub mod ipc;
pub mod memory;

pub use column_data::ColumnData;
pub use csv::{CsvStore, CsvTable};
pub use ipc::{IpcStore, IpcTable};
pub use memory::{MemoryStore, MemoryTable, MemoryTableData};

/// Store-specific position of a bound column inside an open table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnSlot(pub usize);

pub trait ShardStore {
    type Table: ShardTable;

    /// Opens the shard at `path` and resolves `table` in it. Stores whose files
    /// hold a single table accept `None`.
    fn open(&self, path: &Path, table: Option<&str>) -> Result<Self::Table>;
}

pub trait ShardTable {
    fn path(&self) -> &Path;

    fn row_count(&self) -> usize;

    fn columns(&self) -> Vec<ColumnSpec>;

    fn column_kind(&self, name: &str) -> Option<ValueKind> {
        self.columns()
            .into_iter()
            .find(|c| c.name == name)
            .map(|c| c.kind)
    }

    /// Resolves `name` for subsequent [`ShardTable::load_row`] calls.
    fn bind_column(&mut self, name: &str, kind: ValueKind) -> Result<ColumnSlot>;

    /// Fills `buffers[i]` with the value of `slots[i]` at row `local`.
    fn load_row(
        &mut self,
        local: usize,
        slots: &[ColumnSlot],
        buffers: &mut [ColumnBuffer],
    ) -> Result<()>;
}

/// Shared kind check for `bind_column` implementations
pub(crate) fn check_kind(
    path: &Path,
    name: &str,
    expected: ValueKind,
    found: Option<ValueKind>,
) -> Result<()> {
    match found {
        None => Err(ChainError::UnknownColumn {
            column: name.to_string(),
            path: path.to_path_buf(),
        }),
        Some(found) if found != expected => Err(ChainError::KindMismatch {
            column: name.to_string(),
            expected,
            found,
        }),
        Some(_) => Ok(()),
    }
}

/// On-disk shard format, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardFormat {
    Csv,
    Ipc,
}

impl ShardFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(ShardFormat::Csv),
            "arrow" | "ipc" | "feather" => Some(ShardFormat::Ipc),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ShardFormat::Csv => "csv",
            ShardFormat::Ipc => "arrow",
        }
    }
}

/// Maps a failed `File::open` onto the chain error taxonomy
pub(crate) fn open_error(path: &Path, err: std::io::Error) -> ChainError {
    if err.kind() == std::io::ErrorKind::NotFound {
        ChainError::NotFound(path.to_path_buf())
    } else {
        ChainError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ShardFormat::from_path(Path::new("a/b/Ar42_000.csv")),
            Some(ShardFormat::Csv)
        );
        assert_eq!(
            ShardFormat::from_path(Path::new("x.ARROW")),
            Some(ShardFormat::Ipc)
        );
        assert_eq!(ShardFormat::from_path(Path::new("x.root")), None);
        assert_eq!(ShardFormat::from_path(Path::new("noext")), None);
    }
}
