use std::path::PathBuf;

use clap::{Parser, Subcommand};
use polars::prelude::*;
use tracing_subscriber::EnvFilter;

use diffprimer::config::FilterConfig;
use diffprimer::pipeline::{self, PipelineOpts};

/// diffprimer CLI
#[derive(Parser)]
#[command(name = "diffprimer")]
#[command(version)]
#[command(about = "Classify genome- and family-specific PCR primer pairs", long_about = None)]
struct Cli {
    /// Report progress to the log (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a collection config file and print what was parsed
    Check {
        /// Collection config file (tab-separated)
        #[arg(short = 'i', long = "infile")]
        config: PathBuf,
    },

    /// Classify primers from precomputed prediction and amplification results
    Classify {
        /// Collection config file (tab-separated)
        #[arg(short = 'i', long = "infile")]
        config: PathBuf,
        /// Directory of <query>_vs_<target>.primersearch reports
        #[arg(short = 'p', long)]
        primersearch: PathBuf,
        /// Directory for output files
        #[arg(short = 'o', long, default_value = "differential_primer_results")]
        outdir: PathBuf,
        /// Overwrite an existing, non-empty output directory
        #[arg(long)]
        force: bool,
        /// Restrict primers to those overlapping coding regions
        #[arg(long)]
        filter_cds: bool,
        /// Minimum overlap (bases) for the coding-region clustering
        #[arg(long, default_value_t = 50)]
        min_overlap: u64,
        /// Allow no more than two G+C in the last five bases of a primer
        #[arg(long)]
        filter_gc3prime: bool,
        /// Reject primers whose internal oligo breaks the shape rules
        #[arg(long)]
        filter_oligo: bool,
        /// Directory of <sample>_blast.tab screening results; enables the BLAST filter
        #[arg(long)]
        blast_results: Option<PathBuf>,
        /// Require exactly one product against the negative control
        /// (expects <query>_negative_control.primersearch reports)
        #[arg(long)]
        single_product: bool,
        /// Worker threads for input loading (0/None = all)
        #[arg(long)]
        threads: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Check { config } => cmd_check(config),

        Commands::Classify {
            config,
            primersearch,
            outdir,
            force,
            filter_cds,
            min_overlap,
            filter_gc3prime,
            filter_oligo,
            blast_results,
            single_product,
            threads,
        } => {
            let filters = FilterConfig {
                cds_overlap: filter_cds,
                min_overlap,
                gc3prime: filter_gc3prime,
                oligo: filter_oligo,
                blast: blast_results.is_some(),
                single_product,
            };
            let summary = pipeline::run(PipelineOpts {
                config,
                primersearch_dir: primersearch,
                blast_dir: blast_results,
                outdir,
                force,
                filters,
                threads,
            })?;
            println!(
                "{} samples: {} unique, {} family-specific, {} universal primers",
                summary.samples,
                summary.unique_total,
                summary.family_total,
                summary.universal_total
            );
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_check(config: PathBuf) -> anyhow::Result<()> {
    let specs = diffprimer::config::read_config(&config)?;
    let rows = diffprimer::collection_rows(&specs);

    let names: Vec<String> = rows.iter().map(|r| r.0.clone()).collect();
    let families: Vec<String> = rows.iter().map(|r| r.1.clone()).collect();
    let seqs: Vec<String> = rows.iter().map(|r| r.2.clone()).collect();
    let features: Vec<String> = rows.iter().map(|r| r.3.clone()).collect();
    let primers: Vec<String> = rows.iter().map(|r| r.4.clone()).collect();

    let df = df!(
        "sample"   => names,
        "families" => families,
        "sequence" => seqs,
        "features" => features,
        "primers"  => primers,
    )?;

    // Configure Polars display to show all columns and full cell width.
    std::env::set_var("POLARS_FMT_TABLE_FORMATTING", "UTF8_FULL");
    std::env::set_var("POLARS_FMT_MAX_COLS", "100000");
    std::env::set_var("POLARS_FMT_MAX_ROWS", "1000000");
    std::env::set_var("POLARS_FMT_STR_LEN", "100000");
    std::env::set_var("POLARS_TABLE_WIDTH", "65535");

    println!("{}", df);

    let family_map: std::collections::BTreeMap<String, usize> = specs
        .iter()
        .flat_map(|s| s.families.iter().cloned())
        .fold(std::collections::BTreeMap::new(), |mut acc, f| {
            *acc.entry(f).or_insert(0) += 1;
            acc
        });
    for (family, members) in family_map {
        println!("family {family}: {members} member(s)");
    }
    Ok(())
}
