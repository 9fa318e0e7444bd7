use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;
use rand::Rng;

/// Writes a sharded synthetic radiogenic dataset: `<out>/NN/<iso>_rtd_slim_NNNNNN.csv`
#[derive(Parser, Debug)]
#[command(name = "data_generator")]
struct Args {
    /// Output directory
    #[arg(short, long, default_value = "data")]
    out: PathBuf,

    /// Shards per isotope
    #[arg(short, long, default_value_t = 4)]
    shards: usize,

    /// Rows per shard
    #[arg(short, long, default_value_t = 10_000)]
    rows: usize,

    /// Isotope prefixes
    #[arg(long, default_values_t = ["Ar39".to_string(), "Ar42".to_string(), "K42".to_string()])]
    isotopes: Vec<String>,
}

const HEADER: &str = "run:i32,event:i32,energy_deposit:f64,pixel_x:[i32],pixel_y:[i32],\
                      pixel_reset:[[f64]],pixel_tslr:[[f64]]";

/// One `|`-separated inner list per hit. Inner lists are never empty: a lone
/// empty list would be written as an empty field, which reads back as no hits.
fn nested_field(rng: &mut impl Rng, hits: usize, max: f64) -> String {
    (0..hits)
        .map(|_| {
            (0..rng.random_range(1..3))
                .map(|_| format!("{:.3}", rng.random_range(0.0..max)))
                .collect::<Vec<_>>()
                .join(";")
        })
        .collect::<Vec<_>>()
        .join("|")
}

fn main() -> std::io::Result<()> {
    let args = Args::parse();
    let mut rng = rand::rng();
    let mut written = 0;

    for (run, isotope) in args.isotopes.iter().enumerate() {
        for shard in 0..args.shards {
            let dir = args.out.join(format!("{:02}", shard));
            fs::create_dir_all(&dir)?;
            let path = dir.join(format!("{}_rtd_slim_{:06}.csv", isotope, shard));
            let mut writer = BufWriter::new(File::create(&path)?);
            writeln!(writer, "{}", HEADER)?;

            for i in 0..args.rows {
                let event = shard * args.rows + i;
                let energy: f64 = rng.random_range(0.0..5.0);
                let hits = rng.random_range(0..6);
                let xs: Vec<String> = (0..hits)
                    .map(|_| rng.random_range(0..200).to_string())
                    .collect();
                let ys: Vec<String> = (0..hits)
                    .map(|_| rng.random_range(0..200).to_string())
                    .collect();
                let resets = nested_field(&mut rng, hits, 1.0e-3);
                let tslr = nested_field(&mut rng, hits, 1.0);

                writeln!(
                    writer,
                    "{},{},{:.6},{},{},{},{}",
                    run,
                    event,
                    energy,
                    xs.join(";"),
                    ys.join(";"),
                    resets,
                    tslr
                )?;
            }
            writer.flush()?;
            written += 1;
        }
    }

    println!("Generated {} shards under {}", written, args.out.display());
    Ok(())
}
