use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::Level;

use tract_classify::inference::describe_model;
use tract_classify::report::{read_scores, ReportFile};
use tract_classify::{
    rank, Classifier, ExecutionMode, LabelCatalog, Layout, PreprocessConfig, RankedPrediction,
    TractProvider,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log debug output (shapes, timings) to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one or more images with an ONNX model
    Classify(ClassifyArgs),
    /// Rank a precomputed score vector
    Rank(RankArgs),
    /// Print the layers of an ONNX model
    Inspect(InspectArgs),
}

#[derive(clap::Args)]
struct InputArgs {
    /// Axis order of the model input
    #[arg(long, value_enum, default_value_t = Layout::Nchw)]
    layout: Layout,
    /// Length of the shorter image side before cropping
    #[arg(long, default_value_t = 256)]
    resize: u32,
    /// Side of the square center crop fed to the model
    #[arg(long, default_value_t = 224)]
    crop: u32,
}

impl InputArgs {
    fn config(&self) -> PreprocessConfig {
        PreprocessConfig {
            resize: self.resize,
            crop: self.crop,
            layout: self.layout,
            ..Default::default()
        }
    }
}

#[derive(clap::Args)]
struct ClassifyArgs {
    /// Path to the onnx model
    #[arg(short, long)]
    model: PathBuf,
    /// Path to the class names, one per line
    #[arg(short, long)]
    labels: PathBuf,
    /// Number of classes to print per image
    #[arg(short = 'k', long, default_value_t = 5)]
    top_k: usize,
    /// Execution mode handed to the model
    #[arg(long, value_enum, default_value_t = ExecutionMode::Eval)]
    mode: ExecutionMode,
    /// Also write the predictions to this csv file
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[command(flatten)]
    input: InputArgs,
    /// Images to classify
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

#[derive(clap::Args)]
struct RankArgs {
    /// Path to a csv file holding one score per class
    #[arg(short, long)]
    scores: PathBuf,
    /// Path to the class names, one per line
    #[arg(short, long)]
    labels: PathBuf,
    /// Number of classes to print
    #[arg(short = 'k', long, default_value_t = 5)]
    top_k: usize,
}

#[derive(clap::Args)]
struct InspectArgs {
    /// Path to the onnx model
    #[arg(short, long)]
    model: PathBuf,
    #[command(flatten)]
    input: InputArgs,
}

fn print_ranked(ranked: &[RankedPrediction]) {
    for (i, p) in ranked.iter().enumerate() {
        println!("{:>3}. {:<50} {:6.2}%", i + 1, p.label, p.probability);
    }
}

fn load_labels(path: &Path) -> anyhow::Result<LabelCatalog> {
    LabelCatalog::from_path(path).with_context(|| format!("reading labels {}", path.display()))
}

fn classify(args: ClassifyArgs) -> anyhow::Result<()> {
    let config = args.input.config();
    let labels = load_labels(&args.labels)?;
    let provider = TractProvider::load(&args.model, &config, args.mode)
        .with_context(|| format!("loading model {}", args.model.display()))?;
    let classifier = Classifier::new(provider, labels, config)?;

    // dropped without commit on the first failing image, which discards it
    let mut report = match &args.output {
        Some(path) => Some(
            ReportFile::create(path).with_context(|| format!("creating {}", path.display()))?,
        ),
        None => None,
    };

    let pb = if args.images.len() > 1 {
        let pb = ProgressBar::new(args.images.len() as u64);
        pb.set_style(ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} {wide_msg}",
        )?);
        pb
    } else {
        ProgressBar::hidden()
    };

    for path in &args.images {
        pb.set_message(path.display().to_string());
        let result = classifier
            .classify_path(path, args.top_k)
            .with_context(|| format!("classifying {}", path.display()))?;
        pb.suspend(|| {
            println!(
                "{}: {} ({:.2}%)",
                path.display(),
                result.top1.label,
                result.top1.probability
            );
            print_ranked(&result.ranked);
        });
        if let Some(report) = report.as_mut() {
            report.write(&path.display().to_string(), &result.ranked)?;
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    if let Some(report) = report {
        report.commit()?;
    }
    Ok(())
}

fn rank_scores(args: RankArgs) -> anyhow::Result<()> {
    let labels = load_labels(&args.labels)?;
    let file = File::open(&args.scores)
        .with_context(|| format!("opening scores {}", args.scores.display()))?;
    let scores = read_scores(file)?;
    let ranked = rank(&scores, labels.as_slice(), args.top_k)?;
    print_ranked(&ranked);
    Ok(())
}

fn inspect(args: InspectArgs) -> anyhow::Result<()> {
    let layers = describe_model(&args.model, &args.input.config())
        .with_context(|| format!("loading model {}", args.model.display()))?;
    println!("Layers in {}:", args.model.display());
    for layer in &layers {
        println!("#{} {} {}", layer.id, layer.name, layer.op);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    match cli.command {
        Commands::Classify(args) => classify(args),
        Commands::Rank(args) => rank_scores(args),
        Commands::Inspect(args) => inspect(args),
    }
}
