use std::{fmt, str::FromStr, sync::Arc};

use crate::{
    chain::{
        Chain, ChainError, ColumnBuffer, ColumnHandle, FilterPredicate, Record, Result, Value,
    },
    store::ShardStore,
};

type RecordTest = dyn Fn(&Record<'_>) -> bool + Send + Sync;

/// Boolean condition over the current record. A list of cuts is combined by AND.
#[derive(Clone)]
pub enum Cut {
    /// Scalar column compared against a literal
    Compare {
        column: String,
        predicate: FilterPredicate,
    },
    /// Any scalar in the (flattened) column lies strictly inside `(min, max)`
    AnyInRange { column: String, min: f64, max: f64 },
    /// Arbitrary test over one or more columns
    Custom(Arc<RecordTest>),
}

impl fmt::Debug for Cut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cut::Compare { column, predicate } => f
                .debug_struct("Compare")
                .field("column", column)
                .field("predicate", predicate)
                .finish(),
            Cut::AnyInRange { column, min, max } => f
                .debug_struct("AnyInRange")
                .field("column", column)
                .field("min", min)
                .field("max", max)
                .finish(),
            Cut::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Cut {
    pub fn compare(column: &str, predicate: FilterPredicate) -> Self {
        Cut::Compare {
            column: column.to_string(),
            predicate,
        }
    }

    pub fn any_in_range(column: &str, min: f64, max: f64) -> Self {
        Cut::AnyInRange {
            column: column.to_string(),
            min,
            max,
        }
    }

    pub fn custom<F>(test: F) -> Self
    where
        F: Fn(&Record<'_>) -> bool + Send + Sync + 'static,
    {
        Cut::Custom(Arc::new(test))
    }

    /// Declares the referenced column on `chain` and resolves it to a handle
    pub(crate) fn compile<S: ShardStore>(&self, chain: &mut Chain<S>) -> Result<CompiledCut> {
        match self {
            Cut::Compare { column, predicate } => {
                let handle = chain.declare_inferred(column)?;
                if handle.kind().is_sequence() {
                    return Err(ChainError::InvalidArgument(format!(
                        "cannot compare sequence column `{column}` ({}); use any(...)",
                        handle.kind()
                    )));
                }
                Ok(CompiledCut::Compare(handle, predicate.clone()))
            }
            Cut::AnyInRange { column, min, max } => {
                let handle = chain.declare_inferred(column)?;
                Ok(CompiledCut::AnyInRange(handle, *min, *max))
            }
            Cut::Custom(test) => Ok(CompiledCut::Custom(Arc::clone(test))),
        }
    }
}

/// Cut with its columns resolved to handles
#[derive(Clone)]
pub(crate) enum CompiledCut {
    Compare(ColumnHandle, FilterPredicate),
    AnyInRange(ColumnHandle, f64, f64),
    Custom(Arc<RecordTest>),
}

impl CompiledCut {
    pub(crate) fn eval(&self, record: &Record<'_>) -> bool {
        match self {
            CompiledCut::Compare(handle, predicate) => {
                matches_predicate(record.column(*handle), predicate)
            }
            CompiledCut::AnyInRange(handle, min, max) => record
                .column(*handle)
                .flat_values()
                .any(|v| v > *min && v < *max),
            CompiledCut::Custom(test) => (**test)(record),
        }
    }
}

/// All cuts pass; an empty list passes everything
pub(crate) fn pass_all(cuts: &[CompiledCut], record: &Record<'_>) -> bool {
    cuts.iter().all(|c| c.eval(record))
}

pub(crate) fn compile_all<S: ShardStore>(
    cuts: &[Cut],
    chain: &mut Chain<S>,
) -> Result<Vec<CompiledCut>> {
    cuts.iter().map(|c| c.compile(chain)).collect()
}

/// Integer columns against integer literals compare exactly; anything else as `f64`
fn matches_predicate(value: &ColumnBuffer, predicate: &FilterPredicate) -> bool {
    fn cmp(value: &ColumnBuffer, lit: Value) -> Option<std::cmp::Ordering> {
        match (value.as_i64(), lit) {
            (Some(v), Value::Int(l)) => Some(v.cmp(&l)),
            _ => value.as_f64()?.partial_cmp(&lit.as_f64()),
        }
    }

    use std::cmp::Ordering::*;
    match predicate {
        FilterPredicate::Equals(lit) => cmp(value, *lit) == Some(Equal),
        FilterPredicate::GreaterThan(lit) => cmp(value, *lit) == Some(Greater),
        FilterPredicate::LessThan(lit) => cmp(value, *lit) == Some(Less),
        FilterPredicate::Between(lo, hi) => {
            matches!(cmp(value, *lo), Some(Greater | Equal))
                && matches!(cmp(value, *hi), Some(Less | Equal))
        }
    }
}

impl FromStr for Cut {
    type Err = ChainError;

    /// Parses `col>v`, `col<v`, `col==v`, `col=lo..hi` and `any(col,min,max)`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || ChainError::Parse(format!("invalid cut `{s}`"));

        if let Some(args) = s.strip_prefix("any(").and_then(|r| r.strip_suffix(')')) {
            let parts: Vec<&str> = args.split(',').map(str::trim).collect();
            let [column, min, max] = parts.as_slice() else {
                return Err(invalid());
            };
            if column.is_empty() {
                return Err(invalid());
            }
            return Ok(Cut::any_in_range(
                column,
                min.parse::<Value>()?.as_f64(),
                max.parse::<Value>()?.as_f64(),
            ));
        }

        if let Some((column, lit)) = s.split_once("==") {
            return Ok(Cut::compare(column.trim(), FilterPredicate::Equals(lit.parse()?)));
        }
        if let Some((column, range)) = s.split_once('=') {
            let (lo, hi) = range.split_once("..").ok_or_else(invalid)?;
            return Ok(Cut::compare(
                column.trim(),
                FilterPredicate::Between(lo.parse()?, hi.parse()?),
            ));
        }
        if let Some((column, lit)) = s.split_once('>') {
            return Ok(Cut::compare(
                column.trim(),
                FilterPredicate::GreaterThan(lit.parse()?),
            ));
        }
        if let Some((column, lit)) = s.split_once('<') {
            return Ok(Cut::compare(column.trim(), FilterPredicate::LessThan(lit.parse()?)));
        }
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates_on_scalars() {
        let int = ColumnBuffer::Int32(5);
        let float = ColumnBuffer::Float64(2.5);
        assert!(matches_predicate(&int, &FilterPredicate::Equals(Value::Int(5))));
        assert!(matches_predicate(&int, &FilterPredicate::GreaterThan(Value::Float(4.5))));
        assert!(matches_predicate(&float, &FilterPredicate::LessThan(Value::Int(3))));
        assert!(matches_predicate(
            &float,
            &FilterPredicate::Between(Value::Float(2.5), Value::Int(3))
        ));
        assert!(!matches_predicate(
            &ColumnBuffer::Float64(f64::NAN),
            &FilterPredicate::LessThan(Value::Int(3))
        ));
    }

    #[test]
    fn test_parse_cuts() {
        match "energy_deposit > 0.5".parse::<Cut>().unwrap() {
            Cut::Compare { column, predicate } => {
                assert_eq!(column, "energy_deposit");
                assert_eq!(predicate, FilterPredicate::GreaterThan(Value::Float(0.5)));
            }
            other => panic!("unexpected {:?}", other),
        }
        match "run=1..3".parse::<Cut>().unwrap() {
            Cut::Compare { predicate, .. } => assert_eq!(
                predicate,
                FilterPredicate::Between(Value::Int(1), Value::Int(3))
            ),
            other => panic!("unexpected {:?}", other),
        }
        match "any(pixel_x, 80, 120)".parse::<Cut>().unwrap() {
            Cut::AnyInRange { column, min, max } => {
                assert_eq!(column, "pixel_x");
                assert_eq!((min, max), (80.0, 120.0));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!("event==7".parse::<Cut>().is_ok());
        assert!("nonsense".parse::<Cut>().is_err());
        assert!("any(x,1)".parse::<Cut>().is_err());
    }
}
