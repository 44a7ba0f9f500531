//! Ingest command

use crate::app::IngestArgs;
use crate::progress;
use anyhow::{bail, Result};
use ragline_core::config::bootstrap_credentials;
use ragline_core::{ingest, Config, Embedder, HttpEmbedder};

pub async fn run(args: IngestArgs, mut config: Config) -> Result<()> {
    if let Some(source) = args.source {
        config.ingest.source_dir = source;
    }
    if args.keep {
        config.ingest.clear_existing = false;
    }

    if config.provider.is_vertex() {
        bootstrap_credentials(&mut config.provider);
    }
    let embedder = HttpEmbedder::from_config(config.provider.clone())?;

    println!(
        "Ingesting {} into {}",
        config.ingest.source_dir.display(),
        config.store.data_dir.display()
    );

    let stats = ingest(
        &config.ingest,
        &config.store.data_dir,
        &embedder,
        Some(Box::new(progress::report)),
    )
    .await?;

    if stats.inserted > 0 {
        eprintln!();
    }
    if stats.cleared {
        println!("Cleared existing store");
    }
    println!("Ingestion complete:");
    println!("  Documents: {}", stats.documents);
    println!("  Chunks:    {}", stats.chunks);
    println!("  Inserted:  {}", stats.inserted);
    if stats.inserted > 0 {
        println!("  Model:     {}", embedder.model_name());
    }

    if let Some(error) = stats.error {
        bail!("Ingestion stopped: {}", error);
    }
    Ok(())
}
