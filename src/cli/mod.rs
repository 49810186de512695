//! ExoVision CLI Module
//!
//! Command-line interface for serving, training and batch prediction.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::inference::{InferenceService, Label};
use crate::registry::{write_trained, ModelArtifact, ModelRegistry};
use crate::server::{run_server, ServerConfig};
use crate::tabular::TabularData;
use crate::training::{fit_model, prepare_dataset, ModelType, TrainingConfig};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn metric_row(name: &str, value: String) {
    println!("  {:<16} {}", muted(name), value.white());
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "exovision")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Exoplanet candidate classification service")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API
    Serve {
        /// Server host
        #[arg(long)]
        host: Option<String>,

        /// Server port
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory for uploaded and trained models
        #[arg(long)]
        models_dir: Option<String>,
    },

    /// Train a classifier from labeled CSV data
    Train {
        /// Labeled CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Label column name
        #[arg(short, long, default_value = "label")]
        target: String,

        /// Fraction of rows held out for evaluation
        #[arg(long, default_value = "0.2")]
        test_size: f64,

        /// Seed for the split and the model
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Model type (random_forest, decision_tree, logistic_regression, majority)
        #[arg(short, long, default_value = "random_forest")]
        model: String,

        /// Number of trees for random forests
        #[arg(long, default_value = "100")]
        n_estimators: usize,

        /// Output model file
        #[arg(short, long, default_value = "models/current_model.joblib")]
        output: PathBuf,
    },

    /// Classify every row of a CSV file with a stored model
    Predict {
        /// Model file (.joblib or .pkl)
        #[arg(short, long)]
        model: PathBuf,

        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Write predictions as JSON instead of printing them
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_serve(host: Option<String>, port: Option<u16>, models_dir: Option<String>) -> anyhow::Result<()> {
    let mut config = ServerConfig::default();
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(dir) = models_dir {
        config.initial_model = Some(format!("{}/current_model.joblib", dir));
        config.models_dir = dir;
    }

    println!();
    println!("  {}  {}", "ExoVision".white().bold(), dim(env!("CARGO_PKG_VERSION")));
    println!("  {} http://{}:{}/api", muted("api"), config.host, config.port);
    println!();

    run_server(config).await
}

pub fn cmd_train(
    data_path: &Path,
    target: &str,
    test_size: f64,
    seed: u64,
    model: &str,
    n_estimators: usize,
    output: &Path,
) -> anyhow::Result<()> {
    section("Train");

    let model_type = ModelType::parse(model)
        .ok_or_else(|| anyhow::anyhow!("Invalid model type: {}", model))?;
    let config = TrainingConfig::new(target)
        .with_model(model_type)
        .with_n_estimators(n_estimators)
        .with_test_size(test_size)
        .with_random_state(seed);

    step_run("Loading data");
    let start = Instant::now();
    let table = TabularData::from_csv_path(data_path)?;
    let dataset = prepare_dataset(&table, &config.target_column, config.min_rows)?;
    step_done(&format!(
        "{} usable of {} rows in {:?}",
        dataset.len(),
        table.height(),
        start.elapsed()
    ));

    step_run(&format!("Training {}", model.cyan()));
    let fitted = fit_model(&config, &dataset, test_size, seed)?;
    step_done(&format!("{:.3}s", fitted.metrics.training_time_secs));

    step_run(&format!("Saving → {}", output.display()));
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let artifact = ModelArtifact::new(fitted.classifier)
        .with_evaluation(fitted.evaluation)
        .with_metrics(fitted.metrics.clone());
    let size = write_trained(output, &artifact, &fitted.feature_importance)?;
    step_done(&format!("{} bytes", size));

    let scores = &fitted.metrics.scores;
    println!();
    metric_row("Accuracy", format!("{:.4}", scores.accuracy));
    metric_row("Precision", format!("{:.4}", scores.precision));
    metric_row("Recall", format!("{:.4}", scores.recall));
    metric_row("F1", format!("{:.4}", scores.f1_score));
    metric_row(
        "Samples",
        format!("{} train / {} test", fitted.metrics.train_samples, fitted.metrics.test_samples),
    );

    if !fitted.feature_importance.is_empty() {
        section("Feature importance");
        for weight in &fitted.feature_importance {
            println!("  {:<20} {:.4}", muted(&weight.feature), weight.importance);
        }
    }
    println!();

    Ok(())
}

pub fn cmd_predict(model_path: &Path, data_path: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    section("Predict");

    step_run("Loading model");
    let models_dir = model_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let registry = Arc::new(ModelRegistry::open(models_dir)?);
    let metadata = registry.load_path(model_path)?;
    step_done(metadata.model_type.as_deref().unwrap_or("unknown"));

    step_run("Loading data");
    let table = TabularData::from_csv_path(data_path)?;
    step_done(&format!("{} rows", table.height()));

    let service = InferenceService::new(registry);
    let result = service.predict_tabular(&table)?;

    if let Some(path) = output {
        std::fs::write(path, serde_json::to_vec_pretty(&result)?)?;
        println!("  {} wrote {}", ok("✓"), path.display());
    } else {
        println!();
        println!("  {:>6}  {:<16} {:>10}", muted("Row"), muted("Prediction"), muted("Confidence"));
        println!("  {}", dim(&"─".repeat(36)));
        for row in &result.predictions {
            let label = match row.prediction {
                Label::Confirmed => ok(row.prediction.as_str()),
                Label::FalsePositive => row.prediction.as_str().yellow(),
            };
            println!("  {:>6}  {:<16} {:>10.3}", row.row, label, row.confidence);
        }
    }

    let summary = &result.summary;
    println!();
    metric_row("Total", summary.total.to_string());
    metric_row("Confirmed", summary.confirmed.to_string());
    metric_row("False positive", summary.false_positive.to_string());
    metric_row("Avg confidence", format!("{:.3}", summary.avg_confidence));
    println!();

    Ok(())
}
