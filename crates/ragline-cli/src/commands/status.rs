//! Status command

use crate::app::OutputFormat;
use anyhow::Result;
use ragline_core::{Config, VectorStore};

pub async fn run(config: &Config, format: OutputFormat) -> Result<()> {
    let store = VectorStore::open_dir(&config.store.data_dir)?;
    let chunks = store.count_chunks()?;
    let model = store.current_model()?;
    let sources = store.source_stats()?;

    match format {
        OutputFormat::Json => {
            let body = serde_json::json!({
                "store": config.store.db_path(),
                "chunks": chunks,
                "model": model.as_ref().map(|(name, _)| name),
                "dimensions": model.as_ref().map(|(_, dims)| dims),
                "sources": sources,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Cli => {
            println!("Store:      {}", config.store.db_path().display());
            println!("Chunks:     {}", chunks);
            match model {
                Some((name, dims)) => println!("Model:      {} ({} dimensions)", name, dims),
                None => println!("Model:      (none)"),
            }
            if !sources.is_empty() {
                println!();
                println!("Sources:");
                for source in &sources {
                    println!("  {:<40} {}", source.source, source.chunks);
                }
            }
        }
    }
    Ok(())
}
