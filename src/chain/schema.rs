use log::debug;

use crate::{
    chain::{ChainError, ColumnBuffer, ColumnHandle, ColumnSpec, Result, ValueKind},
    store::{ColumnSlot, ShardTable},
};

/// Declared columns of interest and their chain-owned buffers.
///
/// Buffers live as long as the binder; only their contents change per row.
/// Slots are shard-scoped and refreshed by [`SchemaBinder::bind`] whenever the
/// active shard changes.
#[derive(Debug, Default)]
pub struct SchemaBinder {
    columns: Vec<ColumnSpec>,
    buffers: Vec<ColumnBuffer>,
    slots: Vec<ColumnSlot>,
    bound_shard: Option<usize>,
}

impl SchemaBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a column and allocates its buffer in the kind's empty state.
    ///
    /// Declaring the same name twice returns the existing handle when the kinds
    /// agree.
    pub fn declare(&mut self, name: &str, kind: ValueKind) -> Result<ColumnHandle> {
        if let Some(index) = self.columns.iter().position(|c| c.name == name) {
            let existing = self.columns[index].kind;
            if existing != kind {
                return Err(ChainError::KindMismatch {
                    column: name.to_string(),
                    expected: existing,
                    found: kind,
                });
            }
            return Ok(ColumnHandle { index, kind });
        }

        self.columns.push(ColumnSpec::new(name, kind));
        self.buffers.push(ColumnBuffer::empty(kind));
        // New column has no slot in the current shard yet
        self.bound_shard = None;
        Ok(ColumnHandle {
            index: self.columns.len() - 1,
            kind,
        })
    }

    pub fn handle(&self, name: &str) -> Option<ColumnHandle> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .map(|index| ColumnHandle {
                index,
                kind: self.columns[index].kind,
            })
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn is_bound_to(&self, shard: usize) -> bool {
        self.bound_shard == Some(shard)
    }

    /// Resolves every declared column against the newly active shard
    pub fn bind<T: ShardTable>(&mut self, shard: usize, table: &mut T) -> Result<()> {
        self.bound_shard = None;
        let slots = self
            .columns
            .iter()
            .map(|c| table.bind_column(&c.name, c.kind))
            .collect::<Result<Vec<_>>>()?;
        self.slots = slots;
        self.bound_shard = Some(shard);
        debug!(
            "bound {} columns to shard {} ({})",
            self.columns.len(),
            shard,
            table.path().display()
        );
        Ok(())
    }

    /// Forgets the current binding, e.g. after the bound table was closed
    pub fn unbind(&mut self) {
        self.bound_shard = None;
        self.slots.clear();
    }

    /// Loads row `local` of `table` into every buffer
    pub fn load_from<T: ShardTable>(&mut self, table: &mut T, local: usize) -> Result<()> {
        if self.bound_shard.is_none() {
            return Err(ChainError::InvalidArgument(format!(
                "columns are not bound to {}",
                table.path().display()
            )));
        }
        table.load_row(local, &self.slots, &mut self.buffers)
    }

    pub fn buffer(&self, handle: ColumnHandle) -> &ColumnBuffer {
        &self.buffers[handle.index]
    }

    pub fn buffer_by_name(&self, name: &str) -> Option<&ColumnBuffer> {
        self.handle(name).map(|h| self.buffer(h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ColumnData, MemoryStore, MemoryTableData, ShardStore};
    use std::path::Path;

    fn store_with(columns: &[&str]) -> MemoryStore {
        let mut data = MemoryTableData::new();
        for name in columns {
            data = data
                .with_column(name, ColumnData::from(vec![1.0, 2.0]))
                .unwrap();
        }
        let mut store = MemoryStore::new();
        store.insert("s0", "t", data);
        store
    }

    #[test]
    fn test_declare_is_idempotent_per_kind() {
        let mut binder = SchemaBinder::new();
        let a = binder.declare("x", ValueKind::Float64).unwrap();
        let b = binder.declare("x", ValueKind::Float64).unwrap();
        assert_eq!(a, b);
        assert!(matches!(
            binder.declare("x", ValueKind::Int32),
            Err(ChainError::KindMismatch { .. })
        ));
        assert_eq!(binder.columns().len(), 1);
    }

    #[test]
    fn test_sequence_buffers_start_empty() {
        let mut binder = SchemaBinder::new();
        let h = binder.declare("pixel_x", ValueKind::SeqInt32).unwrap();
        assert_eq!(binder.buffer(h), &ColumnBuffer::SeqInt32(Vec::new()));
    }

    #[test]
    fn test_bind_and_load() {
        let store = store_with(&["x", "y"]);
        let mut table = store.open(Path::new("s0"), None).unwrap();
        let mut binder = SchemaBinder::new();
        let y = binder.declare("y", ValueKind::Float64).unwrap();

        binder.bind(0, &mut table).unwrap();
        assert!(binder.is_bound_to(0));
        binder.load_from(&mut table, 1).unwrap();
        assert_eq!(binder.buffer(y), &ColumnBuffer::Float64(2.0));
        assert_eq!(binder.buffer_by_name("y"), Some(&ColumnBuffer::Float64(2.0)));
    }

    #[test]
    fn test_declare_after_bind_requires_rebind() {
        let store = store_with(&["x", "y"]);
        let mut table = store.open(Path::new("s0"), None).unwrap();
        let mut binder = SchemaBinder::new();
        binder.declare("x", ValueKind::Float64).unwrap();
        binder.bind(0, &mut table).unwrap();

        let y = binder.declare("y", ValueKind::Float64).unwrap();
        assert!(!binder.is_bound_to(0));
        assert!(matches!(
            binder.load_from(&mut table, 1),
            Err(ChainError::InvalidArgument(_))
        ));

        binder.bind(0, &mut table).unwrap();
        binder.load_from(&mut table, 1).unwrap();
        assert_eq!(binder.buffer(y), &ColumnBuffer::Float64(2.0));
    }

    #[test]
    fn test_bind_unknown_column() {
        let store = store_with(&["x"]);
        let mut table = store.open(Path::new("s0"), None).unwrap();
        let mut binder = SchemaBinder::new();
        binder.declare("energy", ValueKind::Float64).unwrap();
        match binder.bind(0, &mut table) {
            Err(ChainError::UnknownColumn { column, .. }) => assert_eq!(column, "energy"),
            other => panic!("expected UnknownColumn, got {:?}", other),
        }
        assert!(!binder.is_bound_to(0));
    }
}
