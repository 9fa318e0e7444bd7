use arrow2::{
    array::{Array, ListArray, PrimitiveArray},
    datatypes::{DataType, Field, PhysicalType},
    io::ipc::read::{FileMetadata, FileReader, read_file_metadata},
};
use log::debug;
use std::{
    collections::HashMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use crate::{
    chain::{ChainError, ColumnBuffer, ColumnSpec, Result, ValueKind},
    store::{ColumnSlot, ShardStore, ShardTable, check_kind, open_error},
};

/// Schema metadata key naming the table an IPC file holds
pub const TABLE_METADATA_KEY: &str = "table";

/// Opens Arrow IPC (Feather v2) shards
#[derive(Debug, Clone, Copy, Default)]
pub struct IpcStore;

impl ShardStore for IpcStore {
    type Table = IpcTable;

    fn open(&self, path: &Path, table: Option<&str>) -> Result<IpcTable> {
        let ipc = IpcTable::open(path)?;
        if let Some(name) = table {
            if ipc.table_name() != name {
                return Err(ChainError::TableNotFound {
                    path: path.to_path_buf(),
                    table: name.to_string(),
                });
            }
        }
        Ok(ipc)
    }
}

/// One open IPC shard. Only the footer and batch lengths are read at open;
/// bound columns are decoded on the first row load.
pub struct IpcTable {
    path: PathBuf,
    table: String,
    metadata: FileMetadata,
    columns: Vec<Option<ColumnSpec>>,
    // offsets[i] = first row of batch i; last entry = row count
    offsets: Vec<usize>,
    bound: Vec<usize>,
    // column index -> its array in every batch
    decoded: HashMap<usize, Vec<Box<dyn Array>>>,
}

impl std::fmt::Debug for IpcTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcTable")
            .field("path", &self.path)
            .field("table", &self.table)
            .field("columns", &self.columns)
            .field("rows", &self.offsets.last())
            .field("decoded", &self.decoded.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl IpcTable {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| open_error(path, e))?;
        let mut reader = BufReader::new(file);
        let metadata = read_file_metadata(&mut reader)?;

        let table = metadata
            .schema
            .metadata
            .get(TABLE_METADATA_KEY)
            .cloned()
            .or_else(|| {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
            })
            .unwrap_or_default();

        // Columns of unsupported types stay unbindable but keep their position
        let columns = metadata
            .schema
            .fields
            .iter()
            .map(|f| kind_of(f.data_type()).map(|k| ColumnSpec::new(f.name.clone(), k)))
            .collect();

        // Batch lengths come from a single cheap column whose arrays are dropped
        let mut offsets = vec![0];
        if let Some(column) = count_column(&metadata.schema.fields) {
            for chunk in FileReader::new(reader, metadata.clone(), Some(vec![column]), None) {
                let rows = chunk?.len();
                let last = offsets.last().copied().unwrap_or_default();
                offsets.push(last + rows);
            }
        }

        debug!(
            "opened ipc shard {} ({} rows in {} batches)",
            path.display(),
            offsets.last().copied().unwrap_or_default(),
            offsets.len() - 1
        );

        Ok(IpcTable {
            path: path.to_path_buf(),
            table,
            metadata,
            columns,
            offsets,
            bound: Vec::new(),
            decoded: HashMap::new(),
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    fn locate(&self, row: usize) -> Option<(usize, usize)> {
        if row >= self.row_count() {
            return None;
        }
        let chunk = self.offsets.partition_point(|&o| o <= row) - 1;
        Some((chunk, row - self.offsets[chunk]))
    }

    fn row_error(&self, row: usize, reason: impl Into<String>) -> ChainError {
        ChainError::RowLoad {
            path: self.path.clone(),
            row,
            reason: reason.into(),
        }
    }

    /// Reads every bound column that is not decoded yet, projecting the rest away
    fn decode_bound(&mut self) -> Result<()> {
        let mut projection: Vec<usize> = self
            .bound
            .iter()
            .copied()
            .filter(|c| !self.decoded.contains_key(c))
            .collect();
        if projection.is_empty() {
            return Ok(());
        }
        // Sorted projections come back in file order
        projection.sort_unstable();

        let file = File::open(&self.path).map_err(|e| open_error(&self.path, e))?;
        let reader = FileReader::new(
            BufReader::new(file),
            self.metadata.clone(),
            Some(projection.clone()),
            None,
        );
        let mut batches: Vec<Vec<Box<dyn Array>>> =
            projection.iter().map(|_| Vec::new()).collect();
        for chunk in reader {
            for (column, array) in batches.iter_mut().zip(chunk?.into_arrays()) {
                column.push(array);
            }
        }

        let expected = self.offsets.len() - 1;
        if let Some(column) = batches.iter().find(|b| b.len() != expected) {
            return Err(ChainError::Parse(format!(
                "{} changed since open: {} batches, expected {}",
                self.path.display(),
                column.len(),
                expected
            )));
        }

        debug!(
            "decoded columns {:?} of {}",
            projection,
            self.path.display()
        );
        self.decoded.extend(projection.into_iter().zip(batches));
        Ok(())
    }
}

/// Prefers a primitive column so counting rows skips list payloads
fn count_column(fields: &[Field]) -> Option<usize> {
    if fields.is_empty() {
        return None;
    }
    let primitive = fields
        .iter()
        .position(|f| matches!(f.data_type().to_physical_type(), PhysicalType::Primitive(_)));
    Some(primitive.unwrap_or(0))
}

fn kind_of(data_type: &DataType) -> Option<ValueKind> {
    match data_type.to_logical_type() {
        DataType::Int32 => Some(ValueKind::Int32),
        DataType::Int64 => Some(ValueKind::Int64),
        DataType::Float64 => Some(ValueKind::Float64),
        DataType::List(inner) => match inner.data_type().to_logical_type() {
            DataType::Int32 => Some(ValueKind::SeqInt32),
            DataType::Float64 => Some(ValueKind::SeqFloat64),
            DataType::List(nested) => match nested.data_type().to_logical_type() {
                DataType::Float64 => Some(ValueKind::SeqSeqFloat64),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    }
}

fn primitive<T: arrow2::types::NativeType>(array: &dyn Array) -> Option<&PrimitiveArray<T>> {
    array.as_any().downcast_ref::<PrimitiveArray<T>>()
}

fn list(array: &dyn Array) -> Option<&ListArray<i32>> {
    array.as_any().downcast_ref::<ListArray<i32>>()
}

/// Copies element `row` of `array` into `out`, reusing sequence storage
fn copy_value(array: &dyn Array, row: usize, out: &mut ColumnBuffer) -> Option<()> {
    match out {
        ColumnBuffer::Int32(v) => *v = primitive::<i32>(array)?.value(row),
        ColumnBuffer::Int64(v) => *v = primitive::<i64>(array)?.value(row),
        ColumnBuffer::Float64(v) => *v = primitive::<f64>(array)?.value(row),
        ColumnBuffer::SeqInt32(v) => {
            let values = list(array)?.value(row);
            v.clear();
            v.extend_from_slice(primitive::<i32>(values.as_ref())?.values());
        }
        ColumnBuffer::SeqFloat64(v) => {
            let values = list(array)?.value(row);
            v.clear();
            v.extend_from_slice(primitive::<f64>(values.as_ref())?.values());
        }
        ColumnBuffer::SeqSeqFloat64(v) => {
            let outer = list(array)?.value(row);
            let outer = list(outer.as_ref())?;
            v.resize_with(outer.len(), Vec::new);
            for (i, inner) in v.iter_mut().enumerate() {
                let values = outer.value(i);
                inner.clear();
                inner.extend_from_slice(primitive::<f64>(values.as_ref())?.values());
            }
        }
    }
    Some(())
}

impl ShardTable for IpcTable {
    fn path(&self) -> &Path {
        &self.path
    }

    fn row_count(&self) -> usize {
        self.offsets.last().copied().unwrap_or_default()
    }

    fn columns(&self) -> Vec<ColumnSpec> {
        self.columns.iter().flatten().cloned().collect()
    }

    fn bind_column(&mut self, name: &str, kind: ValueKind) -> Result<ColumnSlot> {
        let pos = self
            .columns
            .iter()
            .position(|c| c.as_ref().is_some_and(|c| c.name == name));
        let found = pos.and_then(|p| self.columns[p].as_ref()).map(|c| c.kind);
        check_kind(&self.path, name, kind, found)?;
        let pos = pos.unwrap_or_default();
        if !self.bound.contains(&pos) {
            self.bound.push(pos);
        }
        Ok(ColumnSlot(pos))
    }

    fn load_row(
        &mut self,
        local: usize,
        slots: &[ColumnSlot],
        buffers: &mut [ColumnBuffer],
    ) -> Result<()> {
        let (chunk, row) = self
            .locate(local)
            .ok_or_else(|| self.row_error(local, "row out of range"))?;
        if slots.iter().any(|s| !self.decoded.contains_key(&s.0)) {
            self.decode_bound()?;
        }

        for (slot, buffer) in slots.iter().zip(buffers.iter_mut()) {
            let array = self
                .decoded
                .get(&slot.0)
                .and_then(|batches| batches.get(chunk))
                .ok_or_else(|| {
                    self.row_error(local, format!("column slot {} was never bound", slot.0))
                })?;
            copy_value(array.as_ref(), row, buffer).ok_or_else(|| {
                self.row_error(
                    local,
                    format!("column {} is not {}", slot.0, buffer.kind()),
                )
            })?;
        }
        Ok(())
    }
}
