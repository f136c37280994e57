use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use phylo_merge::aggregate::{
    aggregate, aggregate_relax, discover_genes, incomplete_runs, AggregateConfig, GeneLayout,
    RunReport,
};
use phylo_merge::data::filter::parse_selections;
use phylo_merge::output::{preview, write_table};
use phylo_merge::prepare::{prepare_alignment, prepare_selection, AlignmentOutputs, PrepareInputs};

#[derive(Parser, Debug)]
#[command(name = "phylo-merge", version, about = "Merge per-gene comparative-method results")]
struct Cli {
    /// Worker threads for per-gene processing (default: all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge rate trees and matrix files into a summary and a species table
    Merge(MergeArgs),
    /// Merge RELAX results into one table
    MergeRelax {
        #[arg(long)]
        input_data: PathBuf,
        #[arg(long)]
        output_file: PathBuf,
        /// Write the processed/skipped report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Prune and tag a tree for a branch-selection test
    PrepareSelection {
        #[command(flatten)]
        inputs: InputArgs,
        #[arg(short = 'o', long)]
        output_tree: PathBuf,
        #[arg(short = 'a', long)]
        output_fasta: PathBuf,
        /// Trait filter, e.g. `Aquatic_adaptation=3,4`
        #[arg(long, required = true)]
        select: Vec<String>,
    },
    /// Prune a tree and write an alignment for rate inference
    PrepareAlignment {
        #[command(flatten)]
        inputs: InputArgs,
        #[arg(short = 'o', long)]
        output_tree: PathBuf,
        #[arg(short = 'a', long)]
        output_ali: PathBuf,
        #[arg(short = 'r', long)]
        output_traits: PathBuf,
    },
    /// List gene directories whose inference run has not finished
    Check {
        #[arg(long)]
        input_data: PathBuf,
    },
}

#[derive(Args, Debug)]
struct InputArgs {
    #[arg(short = 't', long)]
    tree: PathBuf,
    #[arg(short = 'f', long)]
    fasta: PathBuf,
    /// Trait table (TSV, or CSV by extension)
    #[arg(short = 'p', long)]
    traits: PathBuf,
}

impl From<InputArgs> for PrepareInputs {
    fn from(args: InputArgs) -> Self {
        PrepareInputs {
            tree: args.tree,
            fasta: args.fasta,
            traits: args.traits,
        }
    }
}

#[derive(Args, Debug)]
struct MergeArgs {
    /// Directory holding one subdirectory per gene
    #[arg(long)]
    input_data: PathBuf,
    /// Summary table (TSV, or Parquet by extension)
    #[arg(long)]
    output_cov: PathBuf,
    /// Per-species branch-rate table
    #[arg(long)]
    output_omega: PathBuf,
    /// Trait table used for every gene instead of the per-gene one
    #[arg(long)]
    input_traits: Option<PathBuf>,
    #[arg(long, default_value = "historical_Ne", conflicts_with = "no_traits")]
    trait_column: String,
    /// Skip trait summaries
    #[arg(long)]
    no_traits: bool,
    /// Write the processed/skipped report as JSON
    #[arg(long)]
    report: Option<PathBuf>,
    /// Print the first N summary rows
    #[arg(long)]
    preview: Option<usize>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("configuring worker threads")?;
    }

    match cli.command {
        Command::Merge(args) => run_merge(args),
        Command::MergeRelax {
            input_data,
            output_file,
            report,
        } => {
            let genes = discover_genes(&input_data)?;
            let (table, run) = aggregate_relax(&input_data, &genes, &GeneLayout::default())?;
            write_table(&table, &output_file)?;
            if let Some(path) = &report {
                write_report(&run, path)?;
            }
            Ok(())
        }
        Command::PrepareSelection {
            inputs,
            output_tree,
            output_fasta,
            select,
        } => {
            let filter = parse_selections(select.iter().map(String::as_str))
                .map_err(anyhow::Error::msg)
                .context("parsing --select")?;
            let summary = prepare_selection(&inputs.into(), &filter, &output_tree, &output_fasta)?;
            log::info!("prepared {} species", summary.species);
            Ok(())
        }
        Command::PrepareAlignment {
            inputs,
            output_tree,
            output_ali,
            output_traits,
        } => {
            let outputs = AlignmentOutputs {
                tree: output_tree,
                alignment: output_ali,
                traits: output_traits,
            };
            prepare_alignment(&inputs.into(), &outputs)?;
            Ok(())
        }
        Command::Check { input_data } => {
            let genes = discover_genes(&input_data)?;
            let pending = incomplete_runs(&input_data, &genes, &GeneLayout::default());
            log::info!("{} of {} runs unfinished", pending.len(), genes.len());
            for id in pending {
                println!("{id}");
            }
            Ok(())
        }
    }
}

fn run_merge(args: MergeArgs) -> Result<()> {
    let config = AggregateConfig {
        trait_column: (!args.no_traits).then_some(args.trait_column),
        traits_override: args.input_traits,
        ..AggregateConfig::default()
    };

    let genes = discover_genes(&args.input_data)?;
    let result = aggregate(&args.input_data, &genes, &config)?;

    write_table(&result.summary, &args.output_cov)?;
    write_table(&result.species, &args.output_omega)?;
    if let Some(path) = &args.report {
        write_report(&result.report, path)?;
    }
    if let Some(rows) = args.preview {
        println!("{}", preview(&result.summary, rows)?);
    }
    Ok(())
}

fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, report)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
