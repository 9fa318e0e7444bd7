use std::io::Write;

use log::info;

use crate::{
    chain::{Chain, ChainError, ColumnHandle, Result},
    store::ShardStore,
};

/// Periodic dump of selected columns, every `stride`-th row of a chain.
///
/// Output format, for each printed row:
///
/// ```text
/// event: 10, energy: 0.25
/// 1213141.52.5
/// ```
///
/// The first line holds the scalar columns, the second every scalar of the
/// sequence columns written back to back.
#[derive(Debug, Clone)]
pub struct DiagnosticScan {
    stride: usize,
    scalars: Vec<String>,
    sequences: Vec<String>,
}

impl DiagnosticScan {
    pub fn new<I, J>(stride: usize, scalars: I, sequences: J) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<String>,
        J: IntoIterator,
        J::Item: Into<String>,
    {
        if stride == 0 {
            return Err(ChainError::InvalidArgument("stride must be > 0".into()));
        }
        Ok(DiagnosticScan {
            stride,
            scalars: scalars.into_iter().map(Into::into).collect(),
            sequences: sequences.into_iter().map(Into::into).collect(),
        })
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Scans `chain` and writes every `stride`-th row to `out`.
    ///
    /// All columns are declared and checked against every shard before the
    /// first byte is written. Returns the global indices that were printed.
    pub fn run<S: ShardStore, W: Write>(
        &self,
        chain: &mut Chain<S>,
        out: &mut W,
    ) -> Result<Vec<usize>> {
        let scalars = self.declare_all(chain, &self.scalars)?;
        let sequences = self.declare_all(chain, &self.sequences)?;
        chain.validate_schema()?;

        writeln!(out, "found entries: {}", chain.row_count())?;

        let mut printed = Vec::new();
        let mut cursor = chain.cursor();
        while let Some(record) = cursor.advance()? {
            let index = record.global_index();
            if index % self.stride != 0 {
                continue;
            }

            if !scalars.is_empty() {
                for (i, (name, handle)) in scalars.iter().enumerate() {
                    if i > 0 {
                        write!(out, ", ")?;
                    }
                    write!(out, "{name}: ")?;
                    record.column(*handle).write_flat(out)?;
                }
                writeln!(out)?;
            }
            if !sequences.is_empty() {
                for (_, handle) in &sequences {
                    record.column(*handle).write_flat(out)?;
                }
                writeln!(out)?;
            }
            printed.push(index);
        }

        out.flush()?;
        info!("diagnostic scan printed {} rows", printed.len());
        Ok(printed)
    }

    fn declare_all<'n, S: ShardStore>(
        &self,
        chain: &mut Chain<S>,
        names: &'n [String],
    ) -> Result<Vec<(&'n str, ColumnHandle)>> {
        names
            .iter()
            .map(|name| Ok((name.as_str(), chain.declare_inferred(name)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainConfig;
    use crate::store::{ColumnData, MemoryStore, MemoryTableData};
    use std::path::PathBuf;

    fn single_shard(rows: usize) -> Chain<MemoryStore> {
        let events: Vec<i32> = (0..rows as i32).collect();
        let energy: Vec<f64> = (0..rows).map(|i| i as f64 * 0.5).collect();
        let pixels: Vec<Vec<i32>> = (0..rows as i32).map(|i| vec![i, i + 1]).collect();
        let steps: Vec<Vec<Vec<f64>>> = (0..rows)
            .map(|i| vec![vec![i as f64], vec![], vec![0.5]])
            .collect();
        let data = MemoryTableData::new()
            .with_column("event", ColumnData::from(events))
            .unwrap()
            .with_column("energy", ColumnData::from(energy))
            .unwrap()
            .with_column("pixel_x", ColumnData::from(pixels))
            .unwrap()
            .with_column("steps", ColumnData::from(steps))
            .unwrap();
        let mut store = MemoryStore::new();
        store.insert("shard.csv", "events", data);
        Chain::build(&[PathBuf::from("shard.csv")], store, ChainConfig::default()).unwrap()
    }

    #[test]
    fn test_prints_every_stride_row() {
        let mut chain = single_shard(23);
        let scan = DiagnosticScan::new(10, ["event"], Vec::<String>::new()).unwrap();
        let mut out = Vec::new();
        let printed = scan.run(&mut chain, &mut out).unwrap();
        assert_eq!(printed, vec![0, 10, 20]);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec!["found entries: 23", "event: 0", "event: 10", "event: 20"]
        );
    }

    #[test]
    fn test_output_format() {
        let mut chain = single_shard(3);
        let scan = DiagnosticScan::new(2, ["event", "energy"], ["pixel_x", "steps"]).unwrap();
        let mut out = Vec::new();
        scan.run(&mut chain, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "found entries: 3\n\
             event: 0, energy: 0\n\
             0100.5\n\
             event: 2, energy: 1\n\
             2320.5\n"
        );
    }

    #[test]
    fn test_zero_stride_rejected() {
        assert!(matches!(
            DiagnosticScan::new(0, ["event"], ["pixel_x"]),
            Err(ChainError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_unknown_column_writes_nothing() {
        let mut chain = single_shard(5);
        let scan = DiagnosticScan::new(1, ["event", "nope"], Vec::<String>::new()).unwrap();
        let mut out = Vec::new();
        assert!(matches!(
            scan.run(&mut chain, &mut out),
            Err(ChainError::UnknownColumn { .. })
        ));
        assert!(out.is_empty());
    }
}
