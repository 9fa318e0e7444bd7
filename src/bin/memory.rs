use shard_chain::{ChainConfig, CsvStore, Cut, FileSet, HistogramAggregator};

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _profiler = dhat::Profiler::new_heap();

    // Generate with `cargo run --release --bin data_generator` first
    let files = FileSet::discover("data", "csv")?;
    let mut chain = files.build(CsvStore, ChainConfig::default())?;

    let histogram = HistogramAggregator::fixed(100, 0.0, 200.0)
        .with_cut(Cut::any_in_range("pixel_y", 80.0, 120.0))
        .drain_chain(&mut chain, "pixel_x")?;
    println!(
        "{} rows, {} entries filled",
        chain.row_count(),
        histogram.entries
    );

    println!("Memory benchmark finished. See dhat-heap.json for details");
    Ok(())
}
