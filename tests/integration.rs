use std::fs;
use std::path::{Path, PathBuf};

use arrow2::{
    array::{Array, ListArray, MutableListArray, MutablePrimitiveArray, PrimitiveArray, TryExtend},
    chunk::Chunk,
    datatypes::{DataType, Field, Schema},
    io::ipc::write::{FileWriter, WriteOptions},
};
use shard_chain::{
    ChainConfig, ChainError, CsvStore, Cut, DiagnosticScan, FileSet, HistogramAggregator,
    IpcStore, RangeSpec, ShardStore, count_rows,
};
use tempfile::TempDir;

struct Row {
    event: i32,
    energy: f64,
    pixel_x: Vec<i32>,
}

fn rows(range: std::ops::Range<i32>) -> Vec<Row> {
    range
        .map(|i| Row {
            event: i,
            energy: (i % 7) as f64 * 0.75,
            pixel_x: (0..i % 4).map(|k| 70 + 10 * k + i).collect(),
        })
        .collect()
}

fn write_csv(path: &Path, rows: &[Row]) {
    let mut text = String::from("event:i32,energy_deposit:f64,pixel_x:[i32]\n");
    for row in rows {
        let xs: Vec<String> = row.pixel_x.iter().map(|x| x.to_string()).collect();
        text.push_str(&format!("{},{},{}\n", row.event, row.energy, xs.join(";")));
    }
    fs::write(path, text).unwrap();
}

fn write_ipc(path: &Path, rows: &[Row]) {
    let events = PrimitiveArray::<i32>::from_vec(rows.iter().map(|r| r.event).collect());
    let energy = PrimitiveArray::<f64>::from_vec(rows.iter().map(|r| r.energy).collect());
    let mut pixels = MutableListArray::<i32, MutablePrimitiveArray<i32>>::new();
    pixels
        .try_extend(
            rows.iter()
                .map(|r| Some(r.pixel_x.iter().map(|&x| Some(x)).collect::<Vec<_>>())),
        )
        .unwrap();
    let pixels: ListArray<i32> = pixels.into();

    let schema = Schema::from(vec![
        Field::new("event", DataType::Int32, false),
        Field::new("energy_deposit", DataType::Float64, false),
        Field::new("pixel_x", pixels.data_type().clone(), true),
    ]);
    let chunk = Chunk::new(vec![events.boxed(), energy.boxed(), pixels.boxed()]);

    let file = fs::File::create(path).unwrap();
    let mut writer =
        FileWriter::try_new(file, schema, None, WriteOptions { compression: None }).unwrap();
    writer.write(&chunk, None).unwrap();
    writer.finish().unwrap();
}

/// Two shards per format holding rows 0..30 and 30..55
fn dataset(dir: &Path) -> (FileSet, FileSet) {
    let first = rows(0..30);
    let second = rows(30..55);
    let mut csv = FileSet::new();
    let mut ipc = FileSet::new();
    for (i, part) in [first, second].iter().enumerate() {
        let shard = dir.join(format!("{:02}", i));
        fs::create_dir_all(&shard).unwrap();
        let csv_path = shard.join(format!("Ar42_rtd_slim_{:06}.csv", i));
        let ipc_path = shard.join(format!("Ar42_rtd_slim_{:06}.arrow", i));
        write_csv(&csv_path, part);
        write_ipc(&ipc_path, part);
        csv.add(csv_path);
        ipc.add(ipc_path);
    }
    (csv, ipc)
}

#[test]
fn test_csv_chain_histogram() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.csv");
    let b = dir.path().join("b.csv");
    fs::write(&a, "energy_deposit:f64\n1\n2\n").unwrap();
    fs::write(&b, "energy_deposit:f64\n2\n3\n10\n").unwrap();

    let files: FileSet = [a, b].into_iter().collect();
    let mut chain = files.build(CsvStore, ChainConfig::default()).unwrap();
    assert_eq!(chain.row_count(), 5);

    let snapshot = HistogramAggregator::fixed(5, 0.0, 5.0)
        .drain_chain(&mut chain, "energy_deposit")
        .unwrap();
    assert_eq!(snapshot.counts, vec![0.0, 1.0, 2.0, 1.0, 0.0]);
    assert_eq!(snapshot.overflow, 1.0);
    assert_eq!(snapshot.integral(), 4.0);
}

#[test]
fn test_csv_and_ipc_agree() {
    let dir = TempDir::new().unwrap();
    let (csv, ipc) = dataset(dir.path());

    let aggregator = HistogramAggregator::fixed(20, 60.0, 140.0)
        .with_cut("energy_deposit>1".parse::<Cut>().unwrap());

    let mut csv_chain = csv.build(CsvStore, ChainConfig::default()).unwrap();
    let mut ipc_chain = ipc.build(IpcStore, ChainConfig::default()).unwrap();
    assert_eq!(csv_chain.row_count(), 55);
    assert_eq!(ipc_chain.row_count(), 55);

    let from_csv = aggregator.drain_chain(&mut csv_chain, "pixel_x").unwrap();
    let from_ipc = aggregator.drain_chain(&mut ipc_chain, "pixel_x").unwrap();
    assert_eq!(from_csv, from_ipc);
    assert!(from_csv.entries > 0);

    let scan = DiagnosticScan::new(10, ["event", "energy_deposit"], ["pixel_x"]).unwrap();
    let mut csv_out = Vec::new();
    let mut ipc_out = Vec::new();
    let printed = scan.run(&mut csv_chain, &mut csv_out).unwrap();
    scan.run(&mut ipc_chain, &mut ipc_out).unwrap();
    assert_eq!(printed, vec![0, 10, 20, 30, 40, 50]);
    assert_eq!(csv_out, ipc_out);
}

#[test]
fn test_diagnostic_stride_on_single_shard() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("single.csv");
    write_csv(&path, &rows(0..23));

    let mut chain = FileSet::from(vec![path])
        .build(CsvStore, ChainConfig::default())
        .unwrap();
    let scan = DiagnosticScan::new(10, ["event"], ["pixel_x"]).unwrap();
    let mut out = Vec::new();
    assert_eq!(scan.run(&mut chain, &mut out).unwrap(), vec![0, 10, 20]);

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "found entries: 23");
    assert_eq!(lines[1], "event: 0");
    assert_eq!(lines[3], "event: 10");
    // Row 10 holds pixel_x [80, 90]
    assert_eq!(lines[4], "8090");
}

#[test]
fn test_discover_and_group() {
    let dir = TempDir::new().unwrap();
    dataset(dir.path());
    for i in 0..3 {
        let path = dir.path().join(format!("K42_rtd_slim_{:06}.csv", i));
        write_csv(&path, &rows(0..4));
    }

    let files = FileSet::discover(dir.path(), "csv").unwrap();
    assert_eq!(files.len(), 5);
    let groups = files.group_by_prefix();
    assert_eq!(groups.len(), 2);

    let mut counts = Vec::new();
    for (name, set) in &groups {
        let chain = set.build(CsvStore, ChainConfig::default()).unwrap();
        counts.push((name.clone(), chain.row_count()));
    }
    assert_eq!(
        counts,
        vec![("Ar42".to_string(), 55), ("K42".to_string(), 12)]
    );
}

#[test]
fn test_any_in_range_cut() {
    let dir = TempDir::new().unwrap();
    let (csv, _) = dataset(dir.path());
    let mut chain = csv.build(CsvStore, ChainConfig::default()).unwrap();

    // Rows with a pixel strictly inside (80, 120)
    let expected = rows(0..55)
        .iter()
        .filter(|r| r.pixel_x.iter().any(|&x| x > 80 && x < 120))
        .count() as u64;
    let cut: Cut = "any(pixel_x, 80, 120)".parse().unwrap();
    assert_eq!(count_rows(&mut chain, &[cut]).unwrap(), expected);
}

#[test]
fn test_missing_column_in_later_shard() {
    let dir = TempDir::new().unwrap();
    let good = dir.path().join("00.csv");
    let bad = dir.path().join("01.csv");
    write_csv(&good, &rows(0..3));
    fs::write(&bad, "event:i32\n7\n").unwrap();
    let files: FileSet = [good, bad.clone()].into_iter().collect();

    let mut lazy = files.build(CsvStore, ChainConfig::default()).unwrap();
    let err = HistogramAggregator::fixed(5, 0.0, 5.0)
        .drain_chain(&mut lazy, "energy_deposit")
        .unwrap_err();
    match err {
        ChainError::UnknownColumn { column, path } => {
            assert_eq!(column, "energy_deposit");
            assert_eq!(path, bad);
        }
        other => panic!("expected UnknownColumn, got {:?}", other),
    }

    let mut eager = files
        .build(CsvStore, ChainConfig::default().with_eager_schema_check(true))
        .unwrap();
    assert!(matches!(
        HistogramAggregator::fixed(5, 0.0, 5.0).drain_chain(&mut eager, "energy_deposit"),
        Err(ChainError::SchemaMismatch { .. })
    ));
}

#[test]
fn test_auto_range_and_missing_shard() {
    let dir = TempDir::new().unwrap();
    let (_, ipc) = dataset(dir.path());
    let mut chain = ipc.build(IpcStore, ChainConfig::default()).unwrap();
    let snapshot = HistogramAggregator::new(RangeSpec::Auto { n_bins: 8 })
        .drain_chain(&mut chain, "energy_deposit")
        .unwrap();
    assert_eq!(snapshot.lower, 0.0);
    assert_eq!(snapshot.overflow, 0.0);
    assert_eq!(snapshot.integral(), 55.0);

    let mut paths: Vec<PathBuf> = ipc.paths().to_vec();
    paths.push(dir.path().join("nope.arrow"));
    assert!(matches!(
        FileSet::from(paths).build(IpcStore, ChainConfig::default()),
        Err(ChainError::NotFound(_))
    ));
}

#[test]
fn test_store_reports_missing_table() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.csv");
    write_csv(&path, &rows(0..2));
    assert!(CsvStore.open(&path, Some("events")).is_ok());
    assert!(matches!(
        CsvStore.open(&path, Some("other")),
        Err(ChainError::TableNotFound { .. })
    ));
}
