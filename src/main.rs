//! ExoVision - Main Entry Point
//!
//! Runs the HTTP API by default, or a one-off train/predict command.

use clap::Parser;
use exovision::cli::{cmd_predict, cmd_serve, cmd_train, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "exovision=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { host, port, models_dir }) => {
            cmd_serve(host, port, models_dir).await?;
        }
        Some(Commands::Train { data, target, test_size, seed, model, n_estimators, output }) => {
            cmd_train(&data, &target, test_size, seed, &model, n_estimators, &output)?;
        }
        Some(Commands::Predict { model, data, output }) => {
            cmd_predict(&model, &data, output.as_deref())?;
        }
        None => {
            cmd_serve(None, None, None).await?;
        }
    }

    Ok(())
}
