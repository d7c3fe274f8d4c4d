use anyhow::Context;
use clap::{Parser, Subcommand};
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use triage_engine::{
    assessor::{HttpSeverityAssessor, SeverityAssessor, StaticAssessor},
    config::Config,
    fusion::FusionEngine,
    ml::{ModelArtifact, Trainer, TrainingSummary, TrainingTable},
    models::Observation,
    triage::InferenceContext,
};
use validator::Validate;

#[derive(Parser)]
#[command(name = "triage-cli")]
#[command(about = "Triage engine CLI", long_about = None)]
struct Cli {
    /// Configuration file (defaults to TRIAGE_CONFIG_PATH or config/default.toml)
    #[arg(short, long, global = true, env = "TRIAGE_CONFIG_PATH")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the ensemble on a labeled table and write an artifact
    Train {
        /// Delimited training table with a header row
        #[arg(short, long)]
        data: PathBuf,

        /// Output artifact directory
        #[arg(short, long)]
        output: PathBuf,

        /// Held-out fraction
        #[arg(long)]
        test_size: Option<f64>,

        /// Seed for the split, the forest and the linear SVC
        #[arg(long)]
        seed: Option<u64>,

        /// Field delimiter
        #[arg(long)]
        delimiter: Option<char>,
    },

    /// Triage one observation (JSON file, or - for stdin)
    Predict {
        /// Artifact directory
        #[arg(short, long)]
        artifact: Option<PathBuf>,

        #[arg(value_name = "OBSERVATION")]
        observation: String,

        /// Use this assessor response instead of calling the endpoint, e.g. "2;possible fracture"
        #[arg(short = 'r', long)]
        assessor_response: Option<String>,

        /// Skip the assessor and report the ML score only
        #[arg(long, conflicts_with = "assessor_response")]
        ml_only: bool,
    },

    /// Show an artifact's manifest
    Inspect {
        /// Artifact directory
        #[arg(short, long)]
        artifact: Option<PathBuf>,

        /// Load and cross-check every part, not only the manifest
        #[arg(long)]
        verify: bool,
    },

    /// Fuse an ML score with an external score
    Fuse {
        #[arg(long)]
        ml: i64,

        #[arg(long)]
        external: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "triage_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    match cli.command {
        Commands::Train {
            data,
            output,
            test_size,
            seed,
            delimiter,
        } => {
            let mut ml_config = config.training.clone();
            if let Some(test_size) = test_size {
                ml_config.test_size = test_size;
            }
            if let Some(seed) = seed {
                ml_config.seed = seed;
            }
            if let Some(delimiter) = delimiter {
                ml_config.delimiter = delimiter;
            }

            let table = TrainingTable::from_path(&data, &ml_config)?;
            println!(
                "Read {} rows from {} ({} excluded)",
                table.rows_read,
                data.display(),
                table.rows_excluded()
            );

            let artifact = Trainer::new(ml_config).train(&table)?;
            let manifest = artifact.save(&output)?;

            print_summary(&manifest.info.summary);
            println!();
            println!("Artifact {} written to {}", manifest.info.run_id, output.display());
        }

        Commands::Predict {
            artifact,
            observation,
            assessor_response,
            ml_only,
        } => {
            let dir = artifact.unwrap_or_else(|| config.model.artifact_dir.clone());
            let artifact = Arc::new(ModelArtifact::load(&dir)?);

            let raw = if observation == "-" {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                fs::read_to_string(&observation)
                    .with_context(|| format!("cannot read {}", observation))?
            };
            let observation: Observation =
                serde_json::from_str(&raw).context("observation is not valid JSON")?;
            observation.validate()?;

            let assessor: Arc<dyn SeverityAssessor> = match assessor_response {
                Some(response) => Arc::new(StaticAssessor::new(response)),
                None => Arc::new(HttpSeverityAssessor::from_config(&config.assessor)?),
            };
            let context = InferenceContext::new(artifact, assessor, config.assessor.timeout());

            if ml_only {
                let prediction = context.predict_ml(&observation)?;
                println!("{}", serde_json::to_string_pretty(&prediction)?);
            } else {
                let report = context.triage(&observation).await?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }

        Commands::Inspect { artifact, verify } => {
            let dir = artifact.unwrap_or_else(|| config.model.artifact_dir.clone());
            let manifest = ModelArtifact::read_manifest(&dir)?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);

            if verify {
                let loaded = ModelArtifact::load(&dir)?;
                println!();
                println!(
                    "Verified: {} features, all parts from run {}",
                    loaded.feature_names().len(),
                    loaded.run_id()
                );
            }
        }

        Commands::Fuse { ml, external } => {
            let score = FusionEngine::new().fuse(ml, external)?;
            println!("{}", score);
        }
    }

    Ok(())
}

fn print_summary(summary: &TrainingSummary) {
    println!(
        "Train/test split: {} / {} rows, {} features (test_size {}, seed {})",
        summary.n_train, summary.n_test, summary.n_features, summary.test_size, summary.seed
    );
    for (reason, count) in &summary.rows_excluded {
        println!("  excluded ({}): {}", reason, count);
    }
    println!();
    println!("{:<24} {:>9} {:>9}", "Model", "Accuracy", "Macro F1");
    for (model, metrics) in &summary.evaluation {
        println!(
            "{:<24} {:>9.4} {:>9.4}",
            model.to_string(),
            metrics.accuracy,
            metrics.f1_score
        );
    }
}
