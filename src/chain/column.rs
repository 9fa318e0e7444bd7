use std::io::{self, Write};

use crate::chain::ValueKind;

/// Typed accessor for a declared column, resolved once at declaration time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnHandle {
    pub(crate) index: usize,
    pub(crate) kind: ValueKind,
}

impl ColumnHandle {
    pub fn kind(&self) -> ValueKind {
        self.kind
    }
}

/// Per-column row buffer owned by the chain.
///
/// Scalars are overwritten in place on every load. Sequence variants are cleared
/// and refilled, so their backing storage may grow between rows.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnBuffer {
    Int32(i32),
    Int64(i64),
    Float64(f64),
    SeqInt32(Vec<i32>),
    SeqFloat64(Vec<f64>),
    SeqSeqFloat64(Vec<Vec<f64>>),
}

impl ColumnBuffer {
    /// Empty state for `kind`: zero scalars, empty sequences
    pub fn empty(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Int32 => ColumnBuffer::Int32(0),
            ValueKind::Int64 => ColumnBuffer::Int64(0),
            ValueKind::Float64 => ColumnBuffer::Float64(0.0),
            ValueKind::SeqInt32 => ColumnBuffer::SeqInt32(Vec::new()),
            ValueKind::SeqFloat64 => ColumnBuffer::SeqFloat64(Vec::new()),
            ValueKind::SeqSeqFloat64 => ColumnBuffer::SeqSeqFloat64(Vec::new()),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            ColumnBuffer::Int32(_) => ValueKind::Int32,
            ColumnBuffer::Int64(_) => ValueKind::Int64,
            ColumnBuffer::Float64(_) => ValueKind::Float64,
            ColumnBuffer::SeqInt32(_) => ValueKind::SeqInt32,
            ColumnBuffer::SeqFloat64(_) => ValueKind::SeqFloat64,
            ColumnBuffer::SeqSeqFloat64(_) => ValueKind::SeqSeqFloat64,
        }
    }

    /// Scalar value widened to `f64`; `None` for sequence kinds
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ColumnBuffer::Int32(v) => Some(*v as f64),
            ColumnBuffer::Int64(v) => Some(*v as f64),
            ColumnBuffer::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer scalar value; `None` for float and sequence kinds
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ColumnBuffer::Int32(v) => Some(*v as i64),
            ColumnBuffer::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32_seq(&self) -> Option<&[i32]> {
        match self {
            ColumnBuffer::SeqInt32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64_seq(&self) -> Option<&[f64]> {
        match self {
            ColumnBuffer::SeqFloat64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64_seq_seq(&self) -> Option<&[Vec<f64>]> {
        match self {
            ColumnBuffer::SeqSeqFloat64(v) => Some(v),
            _ => None,
        }
    }

    /// Every scalar in the buffer, nested sequences flattened in order
    pub fn flat_values(&self) -> Box<dyn Iterator<Item = f64> + '_> {
        match self {
            ColumnBuffer::Int32(v) => Box::new(std::iter::once(*v as f64)),
            ColumnBuffer::Int64(v) => Box::new(std::iter::once(*v as f64)),
            ColumnBuffer::Float64(v) => Box::new(std::iter::once(*v)),
            ColumnBuffer::SeqInt32(v) => Box::new(v.iter().map(|&x| x as f64)),
            ColumnBuffer::SeqFloat64(v) => Box::new(v.iter().copied()),
            ColumnBuffer::SeqSeqFloat64(v) => Box::new(v.iter().flatten().copied()),
        }
    }

    /// Writes every contained scalar back to back, without separators
    pub fn write_flat<W: Write>(&self, out: &mut W) -> io::Result<()> {
        match self {
            ColumnBuffer::Int32(v) => write!(out, "{v}"),
            ColumnBuffer::Int64(v) => write!(out, "{v}"),
            ColumnBuffer::Float64(v) => write!(out, "{v}"),
            ColumnBuffer::SeqInt32(v) => v.iter().try_for_each(|x| write!(out, "{x}")),
            ColumnBuffer::SeqFloat64(v) => v.iter().try_for_each(|x| write!(out, "{x}")),
            ColumnBuffer::SeqSeqFloat64(v) => v
                .iter()
                .flatten()
                .try_for_each(|x| write!(out, "{x}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_state_per_kind() {
        assert_eq!(ColumnBuffer::empty(ValueKind::Int32), ColumnBuffer::Int32(0));
        assert_eq!(
            ColumnBuffer::empty(ValueKind::SeqSeqFloat64),
            ColumnBuffer::SeqSeqFloat64(Vec::new())
        );
        for kind in [
            ValueKind::Int32,
            ValueKind::Int64,
            ValueKind::Float64,
            ValueKind::SeqInt32,
            ValueKind::SeqFloat64,
            ValueKind::SeqSeqFloat64,
        ] {
            assert_eq!(ColumnBuffer::empty(kind).kind(), kind);
        }
    }

    #[test]
    fn test_flat_values_nested() {
        let buf = ColumnBuffer::SeqSeqFloat64(vec![vec![1.0, 2.0], vec![], vec![3.5]]);
        assert_eq!(buf.flat_values().collect::<Vec<_>>(), vec![1.0, 2.0, 3.5]);
        assert_eq!(buf.as_f64(), None);
    }

    #[test]
    fn test_write_flat_has_no_separators() {
        let buf = ColumnBuffer::SeqSeqFloat64(vec![vec![1.0, 2.5], vec![3.0]]);
        let mut out = Vec::new();
        buf.write_flat(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "12.53");
    }
}
