use crate::chain::{ColumnBuffer, ValueKind};

/// Fully decoded column of one shard, stored as chunks of rows
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int32(Vec<Vec<i32>>),
    Int64(Vec<Vec<i64>>),
    Float64(Vec<Vec<f64>>),
    SeqInt32(Vec<Vec<Vec<i32>>>),
    SeqFloat64(Vec<Vec<Vec<f64>>>),
    SeqSeqFloat64(Vec<Vec<Vec<Vec<f64>>>>),
}

impl ColumnData {
    pub fn new(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Int32 => ColumnData::Int32(Vec::new()),
            ValueKind::Int64 => ColumnData::Int64(Vec::new()),
            ValueKind::Float64 => ColumnData::Float64(Vec::new()),
            ValueKind::SeqInt32 => ColumnData::SeqInt32(Vec::new()),
            ValueKind::SeqFloat64 => ColumnData::SeqFloat64(Vec::new()),
            ValueKind::SeqSeqFloat64 => ColumnData::SeqSeqFloat64(Vec::new()),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            ColumnData::Int32(_) => ValueKind::Int32,
            ColumnData::Int64(_) => ValueKind::Int64,
            ColumnData::Float64(_) => ValueKind::Float64,
            ColumnData::SeqInt32(_) => ValueKind::SeqInt32,
            ColumnData::SeqFloat64(_) => ValueKind::SeqFloat64,
            ColumnData::SeqSeqFloat64(_) => ValueKind::SeqSeqFloat64,
        }
    }

    pub fn total_len(&self) -> usize {
        match self {
            ColumnData::Int32(chunks) => chunks.iter().map(|c| c.len()).sum(),
            ColumnData::Int64(chunks) => chunks.iter().map(|c| c.len()).sum(),
            ColumnData::Float64(chunks) => chunks.iter().map(|c| c.len()).sum(),
            ColumnData::SeqInt32(chunks) => chunks.iter().map(|c| c.len()).sum(),
            ColumnData::SeqFloat64(chunks) => chunks.iter().map(|c| c.len()).sum(),
            ColumnData::SeqSeqFloat64(chunks) => chunks.iter().map(|c| c.len()).sum(),
        }
    }

    /// Appends another chunk of the same kind. Returns `false` on a kind mismatch.
    pub fn push_chunk(&mut self, chunk: ColumnData) -> bool {
        match (self, chunk) {
            (ColumnData::Int32(a), ColumnData::Int32(b)) => a.extend(b),
            (ColumnData::Int64(a), ColumnData::Int64(b)) => a.extend(b),
            (ColumnData::Float64(a), ColumnData::Float64(b)) => a.extend(b),
            (ColumnData::SeqInt32(a), ColumnData::SeqInt32(b)) => a.extend(b),
            (ColumnData::SeqFloat64(a), ColumnData::SeqFloat64(b)) => a.extend(b),
            (ColumnData::SeqSeqFloat64(a), ColumnData::SeqSeqFloat64(b)) => a.extend(b),
            _ => return false,
        }
        true
    }

    /// Merges all chunks into one so rows can be indexed directly
    pub fn flatten_in_place(&mut self) {
        match self {
            ColumnData::Int32(chunks) => flatten_chunks(chunks),
            ColumnData::Int64(chunks) => flatten_chunks(chunks),
            ColumnData::Float64(chunks) => flatten_chunks(chunks),
            ColumnData::SeqInt32(chunks) => flatten_chunks(chunks),
            ColumnData::SeqFloat64(chunks) => flatten_chunks(chunks),
            ColumnData::SeqSeqFloat64(chunks) => flatten_chunks(chunks),
        }
    }

    /// Copies row `row` into `out`, reusing `out`'s storage where the kinds match.
    ///
    /// Expects a flattened column. Returns `false` if the row does not exist.
    pub fn copy_row(&self, row: usize, out: &mut ColumnBuffer) -> bool {
        match self {
            ColumnData::Int32(chunks) => match first(chunks).get(row) {
                Some(&v) => *out = ColumnBuffer::Int32(v),
                None => return false,
            },
            ColumnData::Int64(chunks) => match first(chunks).get(row) {
                Some(&v) => *out = ColumnBuffer::Int64(v),
                None => return false,
            },
            ColumnData::Float64(chunks) => match first(chunks).get(row) {
                Some(&v) => *out = ColumnBuffer::Float64(v),
                None => return false,
            },
            ColumnData::SeqInt32(chunks) => match first(chunks).get(row) {
                Some(src) => match out {
                    ColumnBuffer::SeqInt32(dst) => {
                        dst.clear();
                        dst.extend_from_slice(src);
                    }
                    _ => *out = ColumnBuffer::SeqInt32(src.clone()),
                },
                None => return false,
            },
            ColumnData::SeqFloat64(chunks) => match first(chunks).get(row) {
                Some(src) => match out {
                    ColumnBuffer::SeqFloat64(dst) => {
                        dst.clear();
                        dst.extend_from_slice(src);
                    }
                    _ => *out = ColumnBuffer::SeqFloat64(src.clone()),
                },
                None => return false,
            },
            ColumnData::SeqSeqFloat64(chunks) => match first(chunks).get(row) {
                Some(src) => match out {
                    ColumnBuffer::SeqSeqFloat64(dst) => {
                        dst.truncate(src.len());
                        for (d, s) in dst.iter_mut().zip(src) {
                            d.clear();
                            d.extend_from_slice(s);
                        }
                        let have = dst.len();
                        dst.extend(src[have..].iter().cloned());
                    }
                    _ => *out = ColumnBuffer::SeqSeqFloat64(src.clone()),
                },
                None => return false,
            },
        }
        true
    }
}

fn first<T>(chunks: &[Vec<T>]) -> &[T] {
    chunks.first().map(Vec::as_slice).unwrap_or(&[])
}

fn flatten_chunks<T>(chunks: &mut Vec<Vec<T>>) {
    if chunks.len() <= 1 {
        return; // Already flat
    }

    // Take ownership of chunks, leaving empty vec
    let mut owned_chunks = std::mem::take(chunks);

    // Use the first chunk as the base (it's already allocated)
    let mut flattened = owned_chunks.remove(0);

    let total: usize = owned_chunks.iter().map(|c| c.len()).sum();
    flattened.reserve(total);

    for chunk in owned_chunks {
        flattened.extend(chunk);
    }

    chunks.push(flattened);
}

impl From<Vec<i32>> for ColumnData {
    fn from(values: Vec<i32>) -> Self {
        ColumnData::Int32(vec![values])
    }
}

impl From<Vec<i64>> for ColumnData {
    fn from(values: Vec<i64>) -> Self {
        ColumnData::Int64(vec![values])
    }
}

impl From<Vec<f64>> for ColumnData {
    fn from(values: Vec<f64>) -> Self {
        ColumnData::Float64(vec![values])
    }
}

impl From<Vec<Vec<i32>>> for ColumnData {
    fn from(values: Vec<Vec<i32>>) -> Self {
        ColumnData::SeqInt32(vec![values])
    }
}

impl From<Vec<Vec<f64>>> for ColumnData {
    fn from(values: Vec<Vec<f64>>) -> Self {
        ColumnData::SeqFloat64(vec![values])
    }
}

impl From<Vec<Vec<Vec<f64>>>> for ColumnData {
    fn from(values: Vec<Vec<Vec<f64>>>) -> Self {
        ColumnData::SeqSeqFloat64(vec![values])
    }
}
