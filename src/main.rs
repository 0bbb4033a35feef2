use clap::{Args, Parser, Subcommand};
use phylo_subsets::decompose::{DecompositionBounds, decompose, decompose_guided, guide_order};
use phylo_subsets::induce::induce_from_files;
use phylo_subsets::io::{read_dataset_taxa, read_taxon_list, read_tree_collection, write_subset_report};
use phylo_subsets::select::select_best;
use phylo_subsets::{Decomposition, PipelineError};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Decomposition and recombination steps of a divide-and-conquer
/// phylogenetic pipeline.
#[derive(Parser, Debug)]
#[command(name = "phylo-subsets", version, about = "Subset decomposition, subtree induction and iteration selection")]
struct Cli {
    /// Quiet mode: only warnings and errors are logged
    #[arg(short = 'q', long = "quiet", global = true, default_value_t = false)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split a dataset's taxa into bounded, overlapping subsets
    Decompose(DecomposeArgs),
    /// Restrict a tree collection to the taxa of one or more taxon lists
    Induce(InduceArgs),
    /// Print the index of the best-scoring iteration
    Select(SelectArgs),
}

#[derive(Args, Debug)]
struct DecomposeArgs {
    /// Newick tree collection whose leaf labels form the taxon set
    #[arg(short = 'i', long = "input", required_unless_present = "taxa")]
    input: Option<PathBuf>,

    /// Taxon list (one label per line) used instead of --input
    #[arg(long = "taxa", conflicts_with = "input")]
    taxa: Option<PathBuf>,

    /// Order the taxa by the first tree of this Newick file instead of by label
    #[arg(short = 'g', long = "guide-tree")]
    guide_tree: Option<PathBuf>,

    /// Output path for the subset report
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Maximum number of taxa per subset
    #[arg(short = 's', long = "max-subset-size")]
    max_subset_size: usize,

    /// Maximum number of taxa shared by sibling subsets
    #[arg(short = 'v', long = "max-overlap", default_value_t = 0)]
    max_overlap: usize,
}

#[derive(Args, Debug)]
struct InduceArgs {
    /// Newick tree collection to restrict
    #[arg(short = 't', long = "trees")]
    trees: PathBuf,

    /// Taxon list files (comma-separated); each is removed once consumed
    #[arg(short = 'l', long = "labels", value_delimiter = ',', required = true)]
    labels: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct SelectArgs {
    /// Log path prefix; iteration i is read from <prefix>logs.<i>
    #[arg(short = 'p', long = "prefix")]
    prefix: PathBuf,

    /// Highest iteration index (inclusive)
    #[arg(short = 'n', long = "max-iteration")]
    max_iteration: usize,

    /// Exit with an error when no iteration produced a score
    #[arg(long = "strict", default_value_t = false)]
    strict: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    let result = match cli.command {
        Command::Decompose(args) => run_decompose(args),
        Command::Induce(args) => run_induce(args),
        Command::Select(args) => run_select(args),
    };

    if let Err(e) = result {
        eprintln!("{e}");
        std::process::exit(exit_code(&e));
    }
}

fn init_tracing(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_code(e: &PipelineError) -> i32 {
    match e {
        PipelineError::InvalidConfiguration { .. } | PipelineError::EmptyTaxonSet => 2,
        PipelineError::MissingInputFile { .. } | PipelineError::MalformedTree { .. } => 3,
        PipelineError::WriteOutput { .. } => 4,
        PipelineError::DecompositionFailure { .. }
        | PipelineError::CoverageGap { .. }
        | PipelineError::OverlapExceeded { .. } => 5,
        PipelineError::NoValidScore { .. } => 6,
    }
}

fn run_decompose(args: DecomposeArgs) -> Result<(), PipelineError> {
    let bounds = DecompositionBounds::new(args.max_subset_size, args.max_overlap)?;

    let t0 = Instant::now();
    let taxa: Vec<String> = match (&args.taxa, &args.input) {
        (Some(list), _) => read_taxon_list(list)?,
        (None, Some(input)) => read_dataset_taxa(input)?.into_iter().collect(),
        (None, None) => Vec::new(),
    };
    tracing::info!("Read {} taxa in {:.3}s", taxa.len(), t0.elapsed().as_secs_f64());

    let decomposition = match &args.guide_tree {
        Some(guide_path) => guided(guide_path, taxa, bounds)?,
        None => decompose(taxa, bounds)?,
    };

    write_subset_report(&args.output, &decomposition)?;
    println!("{}", decomposition.len());
    Ok(())
}

/// Guide order restricted to the requested taxa; taxa missing from the guide
/// tree are appended in label order.
fn guided(guide_path: &Path, taxa: Vec<String>, bounds: DecompositionBounds) -> Result<Decomposition, PipelineError> {
    let guide = read_tree_collection(guide_path)?
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::MalformedTree {
            path: guide_path.to_path_buf(),
            index: 0,
            message: "guide tree file holds no tree".to_string(),
        })?;

    let wanted: BTreeSet<String> = taxa.into_iter().collect();
    let mut order: Vec<String> = guide_order(&guide)?
        .into_iter()
        .filter(|label| wanted.contains(label))
        .collect();
    let placed: HashSet<String> = order.iter().cloned().collect();
    order.extend(wanted.into_iter().filter(|label| !placed.contains(label)));

    decompose_guided(order, bounds)
}

fn run_induce(args: InduceArgs) -> Result<(), PipelineError> {
    let t0 = Instant::now();
    let reports = induce_from_files(&args.trees, &args.labels)?;
    for report in &reports {
        if !report.dropped_trees.is_empty() {
            tracing::warn!(
                "{}: dropped trees {:?} (no kept leaves)",
                report.labels_path.display(),
                report.dropped_trees
            );
        }
    }
    tracing::info!("Induced {} collections in {:.3}s", reports.len(), t0.elapsed().as_secs_f64());
    Ok(())
}

fn run_select(args: SelectArgs) -> Result<(), PipelineError> {
    let selection = select_best(&args.prefix, args.max_iteration);

    if let Some(summary) = selection.summary() {
        tracing::info!(
            "{} of {} iterations scored (mean {:.1}, median {:.1})",
            summary.scored,
            selection.iterations.len(),
            summary.mean,
            summary.median
        );
    }
    if args.strict {
        selection.winner()?;
    }

    println!("{}", selection.best_index());
    Ok(())
}
