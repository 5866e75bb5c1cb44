//! placelink - place-name entity linking CLI
//!
//! Offline pipeline, per category (city / station / district):
//!
//! ```bash
//! # Expand a corpus into a training set + label bundle
//! placelink gen --kind station --corpus stations.csv --artifacts ./artifacts
//!
//! # Pretrain the n-gram embedding (optional; one-hot otherwise)
//! placelink pretrain --kind station --artifacts ./artifacts
//!
//! # Train the classifier
//! placelink train --kind station --artifacts ./artifacts
//!
//! # Resolve a mention
//! placelink link --kind station --artifacts ./artifacts "st laurent"
//!
//! # Digest-gated retraining via a subprocess
//! placelink retrain --kind station --corpus stations.csv -- ./train_station.sh
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use placelink::artifacts::{self, ArtifactPaths, RetrainJob};
use placelink::{
    dataset, embedding, train, ClassifierConfig, EmbeddingConfig, GeneratorConfig, LinkerConfig,
    Mention, MentionClassifier, NgramVocab, PlaceKind, Result, TrainConfig,
};

/// Place-name entity linking: corpus expansion, training, and inference.
#[derive(Parser)]
#[command(name = "placelink", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand a canonical label corpus into a training set
    Gen(GenArgs),
    /// Pretrain the n-gram embedding language model
    Pretrain(PretrainArgs),
    /// Train the mention classifier
    Train(TrainArgs),
    /// Resolve a mention against trained artifacts
    Link(LinkArgs),
    /// Retrain a category if its corpus digest changed
    Retrain(RetrainArgs),
    /// Show which artifacts are present
    Info(InfoArgs),
}

#[derive(clap::Args)]
struct GenArgs {
    /// Place category
    #[arg(long, value_parser = parse_kind)]
    kind: PlaceKind,
    /// Canonical label corpus, one label per row
    #[arg(long)]
    corpus: PathBuf,
    /// Artifact output directory
    #[arg(long, default_value = "./artifacts")]
    artifacts: PathBuf,
    /// Cap on variants per randomized rule
    #[arg(long, default_value_t = 10)]
    max_variants: usize,
    /// Seed for the randomized rules
    #[arg(long, default_value_t = 999)]
    seed: u64,
}

#[derive(clap::Args)]
struct PretrainArgs {
    /// Place category
    #[arg(long, value_parser = parse_kind)]
    kind: PlaceKind,
    /// Artifact directory holding the generated training set
    #[arg(long, default_value = "./artifacts")]
    artifacts: PathBuf,
    /// N-gram size
    #[arg(long, default_value_t = 2)]
    ngram: usize,
    /// Embedding dimension
    #[arg(long, default_value_t = 32)]
    dim: usize,
    /// Hidden layer size of the language model
    #[arg(long, default_value_t = 128)]
    hidden: usize,
    /// Training epochs
    #[arg(long, default_value_t = 15)]
    epochs: usize,
    /// Learning rate
    #[arg(long, default_value_t = 1e-4)]
    learning_rate: f64,
}

#[derive(clap::Args)]
struct TrainArgs {
    /// Place category
    #[arg(long, value_parser = parse_kind)]
    kind: PlaceKind,
    /// Artifact directory
    #[arg(long, default_value = "./artifacts")]
    artifacts: PathBuf,
    /// N-gram size, used when no pretrained vocabulary exists
    #[arg(long, default_value_t = 2)]
    ngram: usize,
    /// Training epochs
    #[arg(long, default_value_t = 50)]
    epochs: usize,
    /// Mini-batch size
    #[arg(long, default_value_t = 64)]
    batch_size: usize,
    /// Initial learning rate
    #[arg(long, default_value_t = 5e-4)]
    learning_rate: f64,
    /// Train fraction of the generated set
    #[arg(long, default_value_t = 0.95)]
    train_fraction: f64,
    /// Hidden layer size
    #[arg(long, default_value_t = 1536)]
    hidden: usize,
    /// Dropout rate
    #[arg(long, default_value_t = 0.5)]
    dropout: f32,
    /// FOFE forgetting factor
    #[arg(long, default_value_t = 0.95)]
    forgetting_factor: f32,
    /// Validation accuracy a checkpoint must exceed
    #[arg(long, default_value_t = 0.97)]
    quality_floor: f64,
    /// Epochs without improvement before stopping (0 disables)
    #[arg(long, default_value_t = 50)]
    patience: usize,
    /// Optional held-out test set (mention,label CSV)
    #[arg(long)]
    test_set: Option<PathBuf>,
}

#[derive(clap::Args)]
struct LinkArgs {
    /// Hinted place category
    #[arg(long, value_parser = parse_kind)]
    kind: PlaceKind,
    /// Artifact directory
    #[arg(long, default_value = "./artifacts")]
    artifacts: PathBuf,
    /// Full source message; the mention must occur within it
    #[arg(long)]
    context: Option<String>,
    /// The mention text to resolve
    text: String,
}

#[derive(clap::Args)]
struct RetrainArgs {
    /// Place category
    #[arg(long, value_parser = parse_kind)]
    kind: PlaceKind,
    /// Corpus whose digest gates the run
    #[arg(long)]
    corpus: PathBuf,
    /// Training command to execute
    #[arg(trailing_var_arg = true, required = true)]
    command: Vec<String>,
}

#[derive(clap::Args)]
struct InfoArgs {
    /// Artifact directory
    #[arg(long, default_value = "./artifacts")]
    artifacts: PathBuf,
}

fn parse_kind(s: &str) -> std::result::Result<PlaceKind, String> {
    PlaceKind::parse(s).ok_or_else(|| format!("unknown category {s:?} (city|station|district)"))
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Gen(args) => cmd_gen(args),
        Commands::Pretrain(args) => cmd_pretrain(args),
        Commands::Train(args) => cmd_train(args),
        Commands::Link(args) => cmd_link(args),
        Commands::Retrain(args) => cmd_retrain(args),
        Commands::Info(args) => cmd_info(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn cmd_gen(args: GenArgs) -> Result<()> {
    std::fs::create_dir_all(&args.artifacts)?;
    let paths = ArtifactPaths::new(&args.artifacts, args.kind);

    let labels = dataset::read_label_corpus(&args.corpus)?;
    let generated = dataset::generate(
        labels,
        &GeneratorConfig {
            max_variants_per_rule: args.max_variants,
            seed: args.seed,
        },
    )?;

    dataset::save_training_set(&generated.samples, paths.training_set())?;
    generated.bundle.save(paths.labels())?;

    println!(
        "{}: {} labels, {} samples, {} conflicts removed",
        args.kind,
        generated.bundle.labels.len(),
        generated.samples.len(),
        generated.conflicts_removed
    );
    Ok(())
}

fn cmd_pretrain(args: PretrainArgs) -> Result<()> {
    let paths = ArtifactPaths::new(&args.artifacts, args.kind);
    let samples = dataset::load_training_set(paths.training_set())?;
    let mentions: Vec<String> = samples.into_iter().map(|s| s.mention).collect();

    let vocab = NgramVocab::build(args.ngram, &mentions)?;
    let config = EmbeddingConfig {
        dim: args.dim,
        hidden_size: args.hidden,
        epochs: args.epochs,
        learning_rate: args.learning_rate,
        ..Default::default()
    };
    let table = embedding::pretrain(&vocab, &mentions, &config)?;

    vocab.save(paths.vocab())?;
    table.save(paths.embedding())?;
    println!(
        "{}: vocabulary {} tokens, embedding {}d",
        args.kind,
        vocab.len(),
        table.dim()
    );
    Ok(())
}

fn cmd_train(args: TrainArgs) -> Result<()> {
    let paths = ArtifactPaths::new(&args.artifacts, args.kind);
    let samples = dataset::load_training_set(paths.training_set())?;
    let bundle = placelink::LabelBundle::load(paths.labels())?;

    // Use the pretrained vocabulary when it exists; otherwise build one from
    // the training set and persist it for serving.
    let vocab = if paths.vocab().exists() {
        NgramVocab::load(paths.vocab())?
    } else {
        let mentions: Vec<String> = samples.iter().map(|s| s.mention.clone()).collect();
        let vocab = NgramVocab::build(args.ngram, &mentions)?;
        vocab.save(paths.vocab())?;
        vocab
    };
    let embedding_table = if paths.embedding().exists() {
        Some(placelink::EmbeddingTable::load(paths.embedding())?)
    } else {
        None
    };

    let config = TrainConfig {
        epochs: args.epochs,
        batch_size: args.batch_size,
        learning_rate: args.learning_rate,
        train_fraction: args.train_fraction,
        quality_floor: args.quality_floor,
        patience: args.patience,
        forgetting_factor: args.forgetting_factor,
        classifier: ClassifierConfig {
            hidden_size: args.hidden,
            dropout_rate: args.dropout,
        },
        ..Default::default()
    };

    let report = train::train(
        &samples,
        &bundle,
        &vocab,
        embedding_table.as_ref(),
        &config,
        paths.model(),
    )?;

    println!(
        "{}: {} epochs, best val_loss {:.4} (epoch {}), final acc {:.4}, f1 {:.4}{}",
        args.kind,
        report.epochs_run,
        report.best_val_loss,
        report.best_epoch + 1,
        report.final_metrics.accuracy,
        report.final_metrics.macro_f1,
        if report.checkpointed { "" } else { " [floor not met]" }
    );

    if let Some(test_set) = args.test_set {
        let test_samples = dataset::load_training_set(&test_set)?;
        let model = MentionClassifier::load(paths.model(), &candle_core::Device::Cpu)?;
        let (metrics, bad) = train::evaluate(
            &model,
            &test_samples,
            &bundle,
            &vocab,
            embedding_table.as_ref(),
            &config,
        )?;
        println!(
            "test: loss {:.4}, acc {:.4}, f1 {:.4}",
            metrics.loss, metrics.accuracy, metrics.macro_f1
        );
        for b in bad {
            println!("  {:?} ({}) -> {}", b.mention, b.truth, b.predicted);
        }
    }
    Ok(())
}

fn cmd_link(args: LinkArgs) -> Result<()> {
    let config = LinkerConfig::default();
    let context = args.context.unwrap_or_else(|| args.text.clone());
    let start = context.find(&args.text).unwrap_or(0);
    let mention = Mention::new(&args.text, start, start + args.text.len(), args.kind);

    // Full cross-category linking when every category is trained; otherwise
    // fall back to the hinted category alone.
    let result = match artifacts::load_linker(&args.artifacts, config.clone()) {
        Ok(linker) => linker.link(&context, &mention)?,
        Err(_) => {
            let category = artifacts::load_category(&args.artifacts, args.kind, &config)?;
            let place = category.resolve(&args.text)?;
            let mut candidates = std::collections::HashMap::new();
            candidates.insert(args.kind, place);
            placelink::LinkingResult {
                kind: args.kind,
                hinted_kind: args.kind,
                candidates,
            }
        }
    };

    println!("{}", serde_json::to_string_pretty(&result).map_err(
        |e| placelink::Error::inference(format!("serialize result: {e}")),
    )?);
    Ok(())
}

fn cmd_retrain(args: RetrainArgs) -> Result<()> {
    let outcome = artifacts::retrain(&RetrainJob {
        kind: args.kind,
        corpus: args.corpus,
        command: args.command,
    })?;
    println!("{}: {:?}", args.kind, outcome);
    Ok(())
}

fn cmd_info(args: InfoArgs) -> Result<()> {
    for kind in PlaceKind::ALL {
        let paths = ArtifactPaths::new(&args.artifacts, kind);
        let flag = |p: PathBuf| if p.exists() { "✓" } else { "✗" };
        println!(
            "{kind:<10} vocab {} embedding {} model {} labels {}",
            flag(paths.vocab()),
            flag(paths.embedding()),
            flag(paths.model()),
            flag(paths.labels())
        );
    }
    Ok(())
}
