//! Ragline CLI
//!
//! Ingest documents, serve the chat API, or chat from the terminal.

use anyhow::{Context, Result};
use clap::Parser;
use ragline_core::error::exit_codes;
use ragline_core::{Config, RaglineError};

mod app;
mod commands;
mod progress;

use app::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Server logs requests at info; one-shot commands stay quiet
    let default_level = match cli.command {
        Commands::Serve(_) => "info",
        _ if cli.verbose => "debug",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<RaglineError>()
            .map(RaglineError::exit_code)
            .unwrap_or(exit_codes::GENERAL_ERROR);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match cli.config {
        Some(ref path) => {
            if !path.exists() {
                return Err(RaglineError::Config(format!("Config file not found: {:?}", path)).into());
            }
            Config::load_from(path)
        }
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    if let Some(dir) = cli.data_dir {
        config.store.data_dir = dir;
    }
    tracing::debug!(data_dir = ?config.store.data_dir, "Configuration loaded");

    match cli.command {
        Commands::Serve(args) => commands::serve::run(args, config).await,
        Commands::Ingest(args) => commands::ingest::run(args, config).await,
        Commands::Chat(args) => commands::chat::run(args, config, cli.format).await,
        Commands::Status => commands::status::run(&config, cli.format).await,
    }
}
