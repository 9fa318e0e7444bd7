use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use crate::{
    chain::{ChainError, ColumnBuffer, ColumnSpec, Result, ValueKind},
    store::{ColumnData, ColumnSlot, ShardStore, ShardTable, check_kind},
};

/// Named columns of one in-memory table; every column holds `rows` rows
#[derive(Debug, Clone, Default)]
pub struct MemoryTableData {
    columns: Vec<(String, ColumnData)>,
    rows: usize,
}

impl MemoryTableData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column. The first column fixes the row count; later columns must match.
    pub fn with_column(mut self, name: &str, mut data: ColumnData) -> Result<Self> {
        data.flatten_in_place();
        let len = data.total_len();
        if !self.columns.is_empty() && len != self.rows {
            return Err(ChainError::InvalidArgument(format!(
                "column `{name}` has {len} rows, table has {}",
                self.rows
            )));
        }
        self.rows = len;
        self.columns.push((name.to_string(), data));
        Ok(self)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }
}

/// Store over tables kept in memory, keyed by path then table name.
///
/// Tracks how many tables are open so callers can check handle usage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shards: HashMap<PathBuf, HashMap<String, Arc<MemoryTableData>>>,
    live: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, table: &str, data: MemoryTableData) {
        self.shards
            .entry(path.into())
            .or_default()
            .insert(table.to_string(), Arc::new(data));
    }

    /// Tables currently open (opened and not yet dropped)
    pub fn live_tables(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Total successful opens since creation
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl ShardStore for MemoryStore {
    type Table = MemoryTable;

    fn open(&self, path: &Path, table: Option<&str>) -> Result<MemoryTable> {
        let tables = self
            .shards
            .get(path)
            .ok_or_else(|| ChainError::NotFound(path.to_path_buf()))?;

        let data = match table {
            Some(name) => tables.get(name),
            None if tables.len() == 1 => tables.values().next(),
            None => None,
        }
        .ok_or_else(|| ChainError::TableNotFound {
            path: path.to_path_buf(),
            table: table.unwrap_or("<unnamed>").to_string(),
        })?;

        self.live.fetch_add(1, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryTable {
            path: path.to_path_buf(),
            data: Arc::clone(data),
            live: Arc::clone(&self.live),
        })
    }
}

/// Open handle on an in-memory table
#[derive(Debug)]
pub struct MemoryTable {
    path: PathBuf,
    data: Arc<MemoryTableData>,
    live: Arc<AtomicUsize>,
}

impl Drop for MemoryTable {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ShardTable for MemoryTable {
    fn path(&self) -> &Path {
        &self.path
    }

    fn row_count(&self) -> usize {
        self.data.rows
    }

    fn columns(&self) -> Vec<ColumnSpec> {
        self.data
            .columns
            .iter()
            .map(|(name, data)| ColumnSpec::new(name.clone(), data.kind()))
            .collect()
    }

    fn bind_column(&mut self, name: &str, kind: ValueKind) -> Result<ColumnSlot> {
        let pos = self.data.columns.iter().position(|(n, _)| n == name);
        check_kind(
            &self.path,
            name,
            kind,
            pos.map(|p| self.data.columns[p].1.kind()),
        )?;
        Ok(ColumnSlot(pos.unwrap_or_default()))
    }

    fn load_row(
        &mut self,
        local: usize,
        slots: &[ColumnSlot],
        buffers: &mut [ColumnBuffer],
    ) -> Result<()> {
        for (slot, buffer) in slots.iter().zip(buffers.iter_mut()) {
            let (_, column) = &self.data.columns[slot.0];
            if !column.copy_row(local, buffer) {
                return Err(ChainError::RowLoad {
                    path: self.path.clone(),
                    row: local,
                    reason: format!("row out of range ({} rows)", self.data.rows),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_tracks_live_handles() {
        let mut store = MemoryStore::new();
        let data = MemoryTableData::new()
            .with_column("x", ColumnData::from(vec![1.0, 2.0]))
            .unwrap();
        store.insert("a", "events", data);

        let t1 = store.open(Path::new("a"), None).unwrap();
        let t2 = store.open(Path::new("a"), Some("events")).unwrap();
        assert_eq!(store.live_tables(), 2);
        drop(t1);
        drop(t2);
        assert_eq!(store.live_tables(), 0);
        assert_eq!(store.open_count(), 2);
    }

    #[test]
    fn test_missing_path_and_table() {
        let mut store = MemoryStore::new();
        store.insert("a", "events", MemoryTableData::new());
        assert!(matches!(
            store.open(Path::new("b"), None),
            Err(ChainError::NotFound(_))
        ));
        assert!(matches!(
            store.open(Path::new("a"), Some("other")),
            Err(ChainError::TableNotFound { .. })
        ));
    }

    #[test]
    fn test_columns_must_share_row_count() {
        let res = MemoryTableData::new()
            .with_column("a", ColumnData::from(vec![1i32, 2]))
            .unwrap()
            .with_column("b", ColumnData::from(vec![1.0]));
        assert!(matches!(res, Err(ChainError::InvalidArgument(_))));
    }
}
