//! ShardChain command line
//!
//! Usage:
//!   shard-chain histogram --column pixel_x --dir data --ext csv
//!   shard-chain dump --stride 10 --scalar run --scalar event --sequence pixel_tslr data/00/shard.csv
//!   shard-chain inventory --dir data

use std::{
    io::{self, Write},
    num::NonZeroUsize,
    path::PathBuf,
    process,
};

use clap::{Args, Parser, Subcommand};
use jemallocator::Jemalloc;
use shard_chain::{
    ChainConfig, ChainError, CsvStore, Cut, DiagnosticScan, FileSet, HistogramAggregator,
    IpcStore, RangeSpec, Result, ShardFormat, ShardStore,
};

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "shard-chain")]
#[command(about = "Stream rows of a chain of shard files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Total row count and a 1D histogram of one column over the whole chain
    Histogram(HistogramArgs),
    /// Print selected columns of every K-th row of one shard
    Dump(DumpArgs),
    /// Group shards under a directory by file-name prefix and count their rows
    Inventory(InventoryArgs),
}

#[derive(Args, Debug)]
struct ChainArgs {
    /// Table to read from every shard
    #[arg(long)]
    table: Option<String>,

    /// Maximum number of simultaneously open shards
    #[arg(long, default_value_t = NonZeroUsize::MIN)]
    max_open: NonZeroUsize,

    /// Check every shard's schema before reading the first row
    #[arg(long)]
    check_schema: bool,
}

impl ChainArgs {
    fn config(&self) -> ChainConfig {
        let mut config = ChainConfig::default()
            .with_max_open_shards(self.max_open)
            .with_eager_schema_check(self.check_schema);
        if let Some(table) = &self.table {
            config = config.with_table(table.clone());
        }
        config
    }
}

#[derive(Args, Debug)]
struct HistogramArgs {
    /// Column to histogram
    #[arg(short, long, default_value = "pixel_x")]
    column: String,

    /// Number of bins
    #[arg(short, long, default_value_t = 100)]
    bins: usize,

    /// Lower edge; taken from the data when omitted
    #[arg(long, requires = "max")]
    min: Option<f64>,

    /// Upper edge (exclusive); taken from the data when omitted
    #[arg(long, requires = "min")]
    max: Option<f64>,

    /// Cut expression, e.g. `energy_deposit>0.5` or `any(pixel_x,80,120)`; repeatable
    #[arg(long = "cut")]
    cuts: Vec<Cut>,

    /// Directory to search for shards
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Shard file extension used with --dir
    #[arg(short, long, default_value = "csv")]
    ext: String,

    #[command(flatten)]
    chain: ChainArgs,

    /// Shard files, in chain order (appended after the --dir files)
    files: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct DumpArgs {
    /// Print every K-th row
    #[arg(short = 'k', long, default_value_t = 10)]
    stride: usize,

    /// Scalar column to print; repeatable
    #[arg(long = "scalar")]
    scalars: Vec<String>,

    /// Sequence column to print flattened; repeatable
    #[arg(long = "sequence")]
    sequences: Vec<String>,

    #[command(flatten)]
    chain: ChainArgs,

    /// Shard file
    file: PathBuf,
}

#[derive(Args, Debug)]
struct InventoryArgs {
    /// Directory to search for shards
    #[arg(short, long)]
    dir: PathBuf,

    /// Shard file extension
    #[arg(short, long, default_value = "csv")]
    ext: String,

    /// Table to read from every shard
    #[arg(long)]
    table: Option<String>,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Histogram(args) => histogram(args),
        Command::Dump(args) => dump(args),
        Command::Inventory(args) => inventory(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Format shared by every file of the set
fn format_of(files: &FileSet) -> Result<ShardFormat> {
    let mut formats = files.paths().iter().map(|p| {
        ShardFormat::from_path(p).ok_or_else(|| {
            ChainError::InvalidArgument(format!("unknown shard format: {}", p.display()))
        })
    });
    let first = formats
        .next()
        .ok_or_else(|| ChainError::InvalidArgument("no shard files given".into()))??;
    for format in formats {
        if format? != first {
            return Err(ChainError::InvalidArgument(
                "shards of one chain must share a format".into(),
            ));
        }
    }
    Ok(first)
}

fn histogram(args: HistogramArgs) -> Result<()> {
    let mut files = match &args.dir {
        Some(dir) => FileSet::discover(dir, &args.ext)?,
        None => FileSet::new(),
    };
    for file in &args.files {
        files.add(file.clone());
    }

    match format_of(&files)? {
        ShardFormat::Csv => run_histogram(&files, CsvStore, &args),
        ShardFormat::Ipc => run_histogram(&files, IpcStore, &args),
    }
}

fn run_histogram<S: ShardStore>(files: &FileSet, store: S, args: &HistogramArgs) -> Result<()> {
    let range = match (args.min, args.max) {
        (Some(lower), Some(upper)) => RangeSpec::Fixed {
            n_bins: args.bins,
            lower,
            upper,
        },
        _ => RangeSpec::Auto { n_bins: args.bins },
    };

    let mut chain = files.build(store, args.chain.config())?;
    let rows = chain.row_count();
    let snapshot = HistogramAggregator::new(range)
        .with_cuts(args.cuts.iter().cloned())
        .drain_chain(&mut chain, &args.column)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "entries: {}", rows)?;
    writeln!(
        out,
        "histogram of `{}`: {} bins over [{}, {})",
        args.column,
        snapshot.counts.len(),
        snapshot.lower,
        snapshot.upper
    )?;
    writeln!(out, "underflow: {}", snapshot.underflow)?;
    for (lo, hi, count) in snapshot.bins() {
        writeln!(out, "[{:.6}, {:.6}) {}", lo, hi, count)?;
    }
    writeln!(out, "overflow: {}", snapshot.overflow)?;
    writeln!(
        out,
        "integral: {}, total filled: {}",
        snapshot.integral(),
        snapshot.total_filled
    )?;
    Ok(())
}

fn dump(args: DumpArgs) -> Result<()> {
    let files = FileSet::from(vec![args.file.clone()]);
    match format_of(&files)? {
        ShardFormat::Csv => run_dump(&files, CsvStore, &args),
        ShardFormat::Ipc => run_dump(&files, IpcStore, &args),
    }
}

fn run_dump<S: ShardStore>(files: &FileSet, store: S, args: &DumpArgs) -> Result<()> {
    let scan = DiagnosticScan::new(args.stride, &args.scalars, &args.sequences)?;
    let mut chain = files.build(store, args.chain.config())?;
    let stdout = io::stdout();
    scan.run(&mut chain, &mut stdout.lock())?;
    Ok(())
}

fn inventory(args: InventoryArgs) -> Result<()> {
    let files = FileSet::discover(&args.dir, &args.ext)?;
    let mut config = ChainConfig::default();
    if let Some(table) = &args.table {
        config = config.with_table(table.clone());
    }

    let mut lines = Vec::new();
    for (group, set) in files.group_by_prefix() {
        let rows = match format_of(&set)? {
            ShardFormat::Csv => set.build(CsvStore, config.clone())?.row_count(),
            ShardFormat::Ipc => set.build(IpcStore, config.clone())?.row_count(),
        };
        lines.push(format!("{}: {} files, {} rows", group, set.len(), rows));
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{} files under {}", files.len(), args.dir.display())?;
    for line in lines {
        writeln!(out, "{}", line)?;
    }
    Ok(())
}
