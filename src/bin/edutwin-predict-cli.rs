//! Ops CLI for the prediction engine: run predict/evaluate/cache-stats and
//! invalidate-* against JSON fixtures, without needing the surrounding
//! HTTP/auth layer.

use clap::{Parser, Subcommand};
use colored::Colorize;
use edutwin_predict::prelude::*;
use edutwin_predict::stores::testing::{
    InMemoryConfigStore, InMemoryKvCache, InMemoryReferenceStore, InMemoryStructureStore, InMemoryUserScoreStore,
};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "edutwin-predict-cli", about = "EduTwin prediction engine ops CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[clap(rename_all = "kebab-case")]
enum Commands {
    /// Run a single prediction against a structure/reference fixture.
    Predict {
        #[arg(long)]
        structure: PathBuf,
        #[arg(long)]
        reference: PathBuf,
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        current_time_point: String,
        #[arg(long, default_value = "knn")]
        regressor: String,
    },

    /// Run the holdout evaluation harness against a reference fixture.
    Evaluate {
        #[arg(long)]
        structure: PathBuf,
        #[arg(long)]
        reference: PathBuf,
        #[arg(long, value_delimiter = ',')]
        input_time_points: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        output_time_points: Vec<String>,
    },

    /// Print the cache's per-family key counts.
    CacheStats,
}

#[derive(serde::Deserialize)]
struct StructureFixture {
    id: String,
    time_points: Vec<String>,
    subjects: Vec<String>,
    scale: String,
}

fn load_structure(path: &PathBuf) -> TeachingStructure {
    let raw = std::fs::read_to_string(path).expect("reading structure fixture");
    let fixture: StructureFixture = serde_json::from_str(&raw).expect("parsing structure fixture");
    TeachingStructure {
        id: fixture.id,
        time_points: fixture.time_points,
        subjects: fixture.subjects,
        scale_type: ScaleType::from_label(&fixture.scale),
    }
}

fn load_reference(path: &PathBuf) -> ReferenceDataset {
    let raw = std::fs::read_to_string(path).expect("reading reference fixture");
    let samples: Vec<ReferenceSample> = serde_json::from_str(&raw).expect("parsing reference fixture");
    ReferenceDataset { samples }
}

fn parse_regressor(name: &str) -> RegressorName {
    match name {
        "kernel_regression" | "kernel" => RegressorName::KernelRegression,
        "lwlr" => RegressorName::Lwlr,
        _ => RegressorName::Knn,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Predict {
            structure,
            reference,
            user_id,
            current_time_point,
            regressor,
        } => {
            let structure = load_structure(&structure);
            let structure_id = structure.id.clone();
            let dataset = load_reference(&reference);

            let structures = InMemoryStructureStore::with(structure);
            let reference_store = InMemoryReferenceStore::with(&structure_id, dataset);
            let user_scores = InMemoryUserScoreStore::default();
            let config_store = InMemoryConfigStore {
                config: Mutex::new(RegressorConfig {
                    name: parse_regressor(&regressor),
                    version: 0,
                    ..Default::default()
                }),
            };
            let cache = CacheLayer::new(InMemoryKvCache::default(), CacheTtls::default());

            let engine = PredictionEngine {
                structures: &structures,
                reference: &reference_store,
                user_scores: &user_scores,
                config: &config_store,
                cache: &cache,
            };

            match engine.predict(&user_id, &structure_id, &current_time_point).await {
                Ok(count) => {
                    println!("{} wrote {} predictions", "ok:".green().bold(), count);
                    let scores = user_scores.load_scores(&user_id, &structure_id).await.unwrap();
                    for (key, record) in scores {
                        if let Some(value) = record.predicted_score {
                            println!(
                                "  {} = {} (source={}, status={})",
                                key,
                                value,
                                record.predicted_source.unwrap_or_default(),
                                record.predicted_status.unwrap_or_default()
                            );
                        }
                    }
                }
                Err(e) => eprintln!("{} {e}", "error:".red().bold()),
            }
        }

        Commands::Evaluate {
            structure,
            reference,
            input_time_points,
            output_time_points,
        } => {
            let structure = load_structure(&structure);
            let dataset = load_reference(&reference);
            let cache = CacheLayer::new(InMemoryKvCache::default(), CacheTtls::default());
            let harness = EvaluationHarness { cache: &cache };

            match harness
                .evaluate(
                    &structure.id,
                    &dataset,
                    structure.scale_type,
                    &input_time_points,
                    &output_time_points,
                    &structure.subjects,
                    RegressorParams::default(),
                )
                .await
            {
                Ok(result) => {
                    println!("{} method={}", "evaluation:".cyan().bold(), result.method);
                    for (name, outcome) in &result.results {
                        match outcome {
                            RegressorResult::Metrics(m) => println!(
                                "  {name}: mae={:.2} rmse={:.2} accuracy={:.1}%",
                                m.mae, m.rmse, m.accuracy
                            ),
                            RegressorResult::Error { error } => println!("  {name}: {} {error}", "error".red()),
                        }
                    }
                    if let Some(best) = result.recommendation {
                        println!("{} {best}", "recommended:".green().bold());
                    }
                }
                Err(e) => eprintln!("{} {e}", "error:".red().bold()),
            }
        }

        Commands::CacheStats => {
            let cache = CacheLayer::new(InMemoryKvCache::default(), CacheTtls::default());
            let stats = cache.stats().await;
            println!("{}", "cache stats:".bold());
            println!("  index keys: {}", stats.index_keys);
            println!("  prediction keys: {}", stats.prediction_keys);
            println!("  evaluation keys: {}", stats.evaluation_keys);
        }
    }
}
