use memchr::memchr_iter;

use crate::chain::ValueKind;
use crate::store::ColumnData;

/// Separator between elements of a sequence field
pub const SEQ_SEP: u8 = b';';
/// Separator between the inner lists of a nested sequence field
pub const NESTED_SEP: u8 = b'|';

/// Splits `data` into at most `num_chunks` ranges that end on a newline
pub fn find_chunk_boundaries(data: &[u8], num_chunks: usize) -> Vec<(usize, usize)> {
    if data.is_empty() || num_chunks == 0 {
        return vec![];
    }

    let chunk_size = data.len() / num_chunks;
    let mut boundaries = Vec::with_capacity(num_chunks);
    let mut start = 0;

    for i in 0..num_chunks - 1 {
        let mut end = ((i + 1) * chunk_size).max(start);

        // Find next newline
        while end < data.len() && data[end] != b'\n' {
            end += 1;
        }

        if end < data.len() {
            end += 1; // Include the newline
        }

        if start < end {
            boundaries.push((start, end));
        }
        start = end;
    }

    // Last chunk gets everything remaining
    if start < data.len() {
        boundaries.push((start, data.len()));
    }

    boundaries
}

/// Iterates the non-empty lines of `data`, stripping a trailing `\r`
pub fn lines(data: &[u8]) -> impl Iterator<Item = &[u8]> + '_ {
    let mut start = 0;
    memchr_iter(b'\n', data)
        .chain(std::iter::once(data.len()))
        .filter_map(move |end| {
            let mut line = &data[start..end];
            start = end + 1;
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            (!line.is_empty()).then_some(line)
        })
}

/// Number of non-empty lines in `data`
pub fn count_lines(data: &[u8]) -> usize {
    lines(data).count()
}

/// Splits one CSV line on commas into `fields` (cleared first)
pub fn split_fields<'a>(line: &'a [u8], fields: &mut Vec<&'a [u8]>) {
    fields.clear();
    let mut field_start = 0;
    for comma_pos in memchr_iter(b',', line) {
        fields.push(&line[field_start..comma_pos]);
        field_start = comma_pos + 1;
    }
    fields.push(&line[field_start..]);
}

/// Guesses the kind of a field under an unannotated header. An empty field
/// could be an empty sequence or a missing scalar, so it says nothing.
pub fn infer_kind(field: &[u8]) -> Option<ValueKind> {
    if field.is_empty() {
        return None;
    }
    let kind = if field.contains(&NESTED_SEP) {
        ValueKind::SeqSeqFloat64
    } else if field.contains(&SEQ_SEP) {
        if split_seq(field).all(|f| atoi_simd::parse::<i32>(f).is_ok()) {
            ValueKind::SeqInt32
        } else {
            ValueKind::SeqFloat64
        }
    } else if atoi_simd::parse::<i64>(field).is_ok() {
        ValueKind::Int64
    } else {
        ValueKind::Float64
    };
    Some(kind)
}

fn split_seq(field: &[u8]) -> impl Iterator<Item = &[u8]> + '_ {
    field.split(|&b| b == SEQ_SEP).filter(|f| !f.is_empty())
}

fn parse_f64(field: &[u8]) -> Result<f64, String> {
    fast_float::parse::<f64, _>(field).map_err(|e| e.to_string())
}

fn parse_i32(field: &[u8]) -> Result<i32, String> {
    atoi_simd::parse::<i32>(field).map_err(|e| e.to_string())
}

/// Typed row batch for one column, appended to by [`push_field`]
pub fn empty_batch(kind: ValueKind, capacity: usize) -> ColumnData {
    match kind {
        ValueKind::Int32 => ColumnData::Int32(vec![Vec::with_capacity(capacity)]),
        ValueKind::Int64 => ColumnData::Int64(vec![Vec::with_capacity(capacity)]),
        ValueKind::Float64 => ColumnData::Float64(vec![Vec::with_capacity(capacity)]),
        ValueKind::SeqInt32 => ColumnData::SeqInt32(vec![Vec::with_capacity(capacity)]),
        ValueKind::SeqFloat64 => ColumnData::SeqFloat64(vec![Vec::with_capacity(capacity)]),
        ValueKind::SeqSeqFloat64 => {
            ColumnData::SeqSeqFloat64(vec![Vec::with_capacity(capacity)])
        }
    }
}

/// Parses `field` and appends it to the single chunk of `batch`
pub fn push_field(batch: &mut ColumnData, field: &[u8]) -> Result<(), String> {
    match batch {
        ColumnData::Int32(chunks) => chunks[0].push(parse_i32(field)?),
        ColumnData::Int64(chunks) => {
            chunks[0].push(atoi_simd::parse::<i64>(field).map_err(|e| e.to_string())?)
        }
        ColumnData::Float64(chunks) => chunks[0].push(parse_f64(field)?),
        ColumnData::SeqInt32(chunks) => {
            let row = split_seq(field).map(parse_i32).collect::<Result<Vec<_>, _>>()?;
            chunks[0].push(row);
        }
        ColumnData::SeqFloat64(chunks) => {
            let row = split_seq(field).map(parse_f64).collect::<Result<Vec<_>, _>>()?;
            chunks[0].push(row);
        }
        ColumnData::SeqSeqFloat64(chunks) => {
            // `|` separates inner lists, so `1;2|` is [[1, 2], []]
            let mut row = Vec::new();
            if !field.is_empty() {
                let mut start = 0;
                for end in memchr_iter(NESTED_SEP, field)
                    .chain(std::iter::once(field.len()))
                {
                    let inner = split_seq(&field[start..end])
                        .map(parse_f64)
                        .collect::<Result<Vec<_>, _>>()?;
                    row.push(inner);
                    start = end + 1;
                }
            }
            chunks[0].push(row);
        }
    }
    Ok(())
}
