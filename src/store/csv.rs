use log::debug;
use memmap2::Mmap;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::{
    collections::HashMap,
    fs::File,
    path::{Path, PathBuf},
};

use crate::{
    chain::{ChainError, ColumnBuffer, ColumnSpec, Result, ValueKind},
    helpers::parse_helpers::{
        count_lines, empty_batch, find_chunk_boundaries, infer_kind, lines, push_field,
        split_fields,
    },
    store::{ColumnData, ColumnSlot, ShardStore, ShardTable, check_kind, open_error},
};

/// Opens memory-mapped CSV shards.
///
/// The header names each column, optionally annotated with its kind
/// (`run:i32,energy:f64,pixel_x:[i32],pixel_reset:[[f64]]`). Unannotated columns
/// are inferred from their first non-empty field. Sequence elements are separated
/// by `;` and the inner lists of nested sequences by `|`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvStore;

impl ShardStore for CsvStore {
    type Table = CsvTable;

    fn open(&self, path: &Path, table: Option<&str>) -> Result<CsvTable> {
        let csv = CsvTable::open(path)?;
        if let Some(name) = table {
            if csv.table_name() != name {
                return Err(ChainError::TableNotFound {
                    path: path.to_path_buf(),
                    table: name.to_string(),
                });
            }
        }
        Ok(csv)
    }
}

/// One open CSV shard. Bound columns are decoded on the first row load.
#[derive(Debug)]
pub struct CsvTable {
    path: PathBuf,
    mmap: Mmap, // owns the CSV bytes
    columns: Vec<ColumnSpec>,
    data_start: usize,
    row_count: usize,
    bound: Vec<usize>,
    decoded: HashMap<usize, ColumnData>,
}

/// Decoded rows of one chunk, in projection order
struct BatchResult {
    columns: Vec<ColumnData>,
    row_count: usize,
}

/// First failure inside a chunk; `row` is chunk-relative
struct ChunkError {
    row: usize,
    reason: String,
}

impl CsvTable {
    /// Maps the file, parses the header and counts rows without decoding them
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| open_error(path, e))?;
        let mmap = unsafe { Mmap::map(&file)? };
        let buf: &[u8] = &mmap[..];

        let header_end = memchr::memchr(b'\n', buf).unwrap_or(buf.len());
        let header_line = buf[..header_end].strip_suffix(b"\r").unwrap_or(&buf[..header_end]);
        if header_line.is_empty() {
            return Err(ChainError::Parse(format!(
                "Missing header line in {}",
                path.display()
            )));
        }

        let data_start = (header_end + 1).min(buf.len());
        let data = &buf[data_start..];
        let columns = Self::parse_header(header_line, data)?;
        let row_count = count_lines(data);

        debug!(
            "opened csv shard {} ({} rows, {} columns)",
            path.display(),
            row_count,
            columns.len()
        );

        Ok(CsvTable {
            path: path.to_path_buf(),
            mmap,
            columns,
            data_start,
            row_count,
            bound: Vec::new(),
            decoded: HashMap::new(),
        })
    }

    /// Table name: the file stem
    pub fn table_name(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }

    /// Resolves column kinds from annotations, inferring the rest from the
    /// first non-empty field below each unannotated header
    fn parse_header(header: &[u8], data: &[u8]) -> Result<Vec<ColumnSpec>> {
        let mut names = Vec::new();
        split_fields(header, &mut names);

        let mut columns = Vec::with_capacity(names.len());
        let mut pending = Vec::new();
        for (i, raw) in names.iter().enumerate() {
            let raw = String::from_utf8_lossy(raw);
            match raw.split_once(':') {
                Some((name, kind)) => columns.push(ColumnSpec::new(name.trim(), kind.parse()?)),
                None => {
                    // Float64 unless some row has a value
                    columns.push(ColumnSpec::new(raw.trim(), ValueKind::Float64));
                    pending.push(i);
                }
            }
        }

        let mut fields = Vec::new();
        for (row, line) in lines(data).enumerate() {
            if row > 0 && pending.is_empty() {
                break;
            }
            split_fields(line, &mut fields);
            if row == 0 && fields.len() != names.len() {
                return Err(ChainError::Parse(format!(
                    "Header/data mismatch: {} vs {}",
                    names.len(),
                    fields.len()
                )));
            }
            pending.retain(|&i| match fields.get(i).and_then(|f| infer_kind(f)) {
                Some(kind) => {
                    columns[i].kind = kind;
                    false
                }
                None => true,
            });
        }

        Ok(columns)
    }

    /// Decodes every bound column that is not decoded yet, in parallel over chunks
    fn decode_bound(&mut self) -> Result<()> {
        let projection: Vec<usize> = self
            .bound
            .iter()
            .copied()
            .filter(|c| !self.decoded.contains_key(c))
            .collect();
        if projection.is_empty() {
            return Ok(());
        }

        let data = &self.mmap[self.data_start..];
        let kinds: Vec<ValueKind> = projection.iter().map(|&c| self.columns[c].kind).collect();
        let num_cols = self.columns.len();

        // Find chunk boundaries (split by newlines)
        let num_threads = rayon::current_num_threads();
        let chunks = find_chunk_boundaries(data, num_threads);
        let estimated_rows = self.row_count / chunks.len().max(1) + 1;

        let batch_results: Vec<std::result::Result<BatchResult, ChunkError>> = chunks
            .par_iter()
            .map(|(start, end)| {
                Self::parse_chunk(
                    &data[*start..*end],
                    num_cols,
                    &projection,
                    &kinds,
                    estimated_rows,
                )
            })
            .collect();

        // Merge batch results into chunked columns
        let mut merged: Vec<ColumnData> = kinds.iter().map(|&k| ColumnData::new(k)).collect();
        let mut rows_before = 0;
        for batch in batch_results {
            let batch = batch.map_err(|e| ChainError::RowLoad {
                path: self.path.clone(),
                row: rows_before + e.row,
                reason: e.reason,
            })?;
            rows_before += batch.row_count;
            for (col, chunk) in merged.iter_mut().zip(batch.columns) {
                col.push_chunk(chunk);
            }
        }

        for (col_idx, mut column) in projection.into_iter().zip(merged) {
            column.flatten_in_place();
            self.decoded.insert(col_idx, column);
        }

        debug!("decoded {} rows of {}", rows_before, self.path.display());
        Ok(())
    }

    fn parse_chunk(
        chunk: &[u8],
        num_cols: usize,
        projection: &[usize],
        kinds: &[ValueKind],
        estimated_rows: usize,
    ) -> std::result::Result<BatchResult, ChunkError> {
        let mut columns: Vec<ColumnData> = kinds
            .iter()
            .map(|&k| empty_batch(k, estimated_rows))
            .collect();

        let mut row_count = 0;
        let mut fields = Vec::with_capacity(num_cols);

        for line in lines(chunk) {
            split_fields(line, &mut fields);

            if fields.len() != num_cols {
                return Err(ChunkError {
                    row: row_count,
                    reason: format!("Expected {} fields, got {}", num_cols, fields.len()),
                });
            }

            // Parse each projected field according to schema
            for (out, &col_idx) in columns.iter_mut().zip(projection) {
                push_field(out, fields[col_idx]).map_err(|e| ChunkError {
                    row: row_count,
                    reason: format!(
                        "field {} `{}`: {}",
                        col_idx,
                        String::from_utf8_lossy(fields[col_idx]),
                        e
                    ),
                })?;
            }

            row_count += 1;
        }

        Ok(BatchResult { columns, row_count })
    }
}

impl ShardTable for CsvTable {
    fn path(&self) -> &Path {
        &self.path
    }

    fn row_count(&self) -> usize {
        self.row_count
    }

    fn columns(&self) -> Vec<ColumnSpec> {
        self.columns.clone()
    }

    fn bind_column(&mut self, name: &str, kind: ValueKind) -> Result<ColumnSlot> {
        let pos = self.columns.iter().position(|c| c.name == name);
        check_kind(&self.path, name, kind, pos.map(|p| self.columns[p].kind))?;
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
        if slots.iter().any(|s| !self.decoded.contains_key(&s.0)) {
            self.decode_bound()?;
        }

        for (slot, buffer) in slots.iter().zip(buffers.iter_mut()) {
            let column = self.decoded.get(&slot.0).ok_or_else(|| {
                ChainError::Parse(format!("column slot {} was never bound", slot.0))
            })?;
            if !column.copy_row(local, buffer) {
                return Err(ChainError::RowLoad {
                    path: self.path.clone(),
                    row: local,
                    reason: format!("row out of range ({} rows)", self.row_count),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_csv(csv: &str) -> NamedTempFile {
        let mut tmp = NamedTempFile::with_suffix(".csv").unwrap();
        write!(tmp, "{}", csv).unwrap();
        tmp
    }

    fn load_all(table: &mut CsvTable, name: &str, kind: ValueKind) -> Vec<ColumnBuffer> {
        let slot = table.bind_column(name, kind).unwrap();
        let mut buffers = vec![ColumnBuffer::empty(kind)];
        (0..table.row_count())
            .map(|row| {
                table.load_row(row, &[slot], &mut buffers).unwrap();
                buffers[0].clone()
            })
            .collect()
    }

    #[test]
    fn test_row_count_and_inferred_schema() {
        let tmp = make_csv("id,value\n1,10.5\n2,20\n\n3,30\n");
        let table = CsvTable::open(tmp.path()).unwrap();
        assert_eq!(table.row_count(), 3);
        assert_eq!(
            table.columns(),
            vec![
                ColumnSpec::new("id", ValueKind::Int64),
                ColumnSpec::new("value", ValueKind::Float64),
            ]
        );
    }

    #[test]
    fn test_inference_skips_empty_fields() {
        let tmp = make_csv("id,pixel_x,note\n1,,\n2,,\n3,4;5,\n");
        let mut table = CsvTable::open(tmp.path()).unwrap();
        assert_eq!(
            table.columns(),
            vec![
                ColumnSpec::new("id", ValueKind::Int64),
                ColumnSpec::new("pixel_x", ValueKind::SeqInt32),
                ColumnSpec::new("note", ValueKind::Float64),
            ]
        );

        let xs = load_all(&mut table, "pixel_x", ValueKind::SeqInt32);
        assert_eq!(
            xs,
            vec![
                ColumnBuffer::SeqInt32(vec![]),
                ColumnBuffer::SeqInt32(vec![]),
                ColumnBuffer::SeqInt32(vec![4, 5]),
            ]
        );
    }

    #[test]
    fn test_annotated_sequences() {
        let tmp = make_csv(
            "run:i32,pixel_x:[i32],pixel_tslr:[[f64]]\n\
             1,3;4;5,1.5;2|3\n\
             2,,\n",
        );
        let mut table = CsvTable::open(tmp.path()).unwrap();

        let runs = load_all(&mut table, "run", ValueKind::Int32);
        assert_eq!(runs, vec![ColumnBuffer::Int32(1), ColumnBuffer::Int32(2)]);

        let xs = load_all(&mut table, "pixel_x", ValueKind::SeqInt32);
        assert_eq!(
            xs,
            vec![ColumnBuffer::SeqInt32(vec![3, 4, 5]), ColumnBuffer::SeqInt32(vec![])]
        );

        let tslr = load_all(&mut table, "pixel_tslr", ValueKind::SeqSeqFloat64);
        assert_eq!(
            tslr[0],
            ColumnBuffer::SeqSeqFloat64(vec![vec![1.5, 2.0], vec![3.0]])
        );
        assert_eq!(tslr[1], ColumnBuffer::SeqSeqFloat64(vec![]));
    }

    #[test]
    fn test_bind_unknown_and_mismatched_columns() {
        let tmp = make_csv("id:i32,value:f64\n1,2.0\n");
        let mut table = CsvTable::open(tmp.path()).unwrap();
        assert!(matches!(
            table.bind_column("nope", ValueKind::Int32),
            Err(ChainError::UnknownColumn { .. })
        ));
        assert!(matches!(
            table.bind_column("id", ValueKind::Float64),
            Err(ChainError::KindMismatch { .. })
        ));
    }

    #[test]
    fn test_malformed_row_is_fatal() {
        let tmp = make_csv("id:i32,value:f64\n1,2.0\n2\n3,4.0\n");
        let mut table = CsvTable::open(tmp.path()).unwrap();
        let slot = table.bind_column("value", ValueKind::Float64).unwrap();
        let mut buffers = vec![ColumnBuffer::empty(ValueKind::Float64)];
        match table.load_row(0, &[slot], &mut buffers) {
            Err(ChainError::RowLoad { row, .. }) => assert_eq!(row, 1),
            other => panic!("expected RowLoad, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = CsvStore
            .open(Path::new("/definitely/not/here.csv"), None)
            .unwrap_err();
        assert!(matches!(err, ChainError::NotFound(_)));
    }

    #[test]
    fn test_table_name_is_file_stem() {
        let tmp = make_csv("id\n1\n");
        let stem = tmp.path().file_stem().unwrap().to_str().unwrap().to_string();
        assert!(CsvStore.open(tmp.path(), Some(&stem)).is_ok());
        assert!(matches!(
            CsvStore.open(tmp.path(), Some("event_tree")),
            Err(ChainError::TableNotFound { .. })
        ));
    }
}
