//! Ingestion pipeline: clear, load, split, embed, insert

use super::chunker::split_text;
use super::loader::load_documents;
use crate::config::IngestConfig;
use crate::error::Result;
use crate::llm::Embedder;
use crate::store::{clear_store_dir, DocumentChunk, VectorStore};
use std::path::Path;

/// Ingestion progress
#[derive(Debug, Clone)]
pub struct IngestProgress {
    pub total_chunks: usize,
    pub embedded_chunks: usize,
}

/// Ingestion statistics
#[derive(Debug, Clone, Default)]
pub struct IngestStats {
    /// Whether an existing store directory was removed
    pub cleared: bool,
    pub documents: usize,
    pub chunks: usize,
    pub inserted: usize,
    /// Embedding or insertion failure that stopped the run
    pub error: Option<String>,
}

impl IngestStats {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Rebuild the vector store at `store_dir` from `config.source_dir`
///
/// A failing embedding or insertion step ends the run; the failure is
/// recorded in [`IngestStats::error`] rather than returned.
pub async fn ingest(
    config: &IngestConfig,
    store_dir: &Path,
    embedder: &dyn Embedder,
    progress: Option<Box<dyn Fn(IngestProgress) + Send + Sync>>,
) -> Result<IngestStats> {
    config.validate()?;

    let mut stats = IngestStats::default();

    if config.clear_existing {
        stats.cleared = clear_store_dir(store_dir)?;
    }
    let store = VectorStore::open_dir(store_dir)?;
    if config.clear_existing && !stats.cleared {
        // Directory could not be removed; start from empty tables instead
        store.clear()?;
    }

    let documents = load_documents(&config.source_dir).await?;
    stats.documents = documents.len();
    tracing::info!("Found {} documents in {:?}", documents.len(), config.source_dir);

    let chunks: Vec<DocumentChunk> = documents
        .iter()
        .flat_map(|doc| {
            split_text(&doc.text, config.chunk_size, config.chunk_overlap)
                .into_iter()
                .map(move |window| {
                    DocumentChunk::on_page(doc.source.clone(), doc.page, window.start, window.text)
                })
        })
        .collect();
    stats.chunks = chunks.len();
    tracing::info!("Split documents into {} chunks", chunks.len());

    if chunks.is_empty() {
        return Ok(stats);
    }

    let embeddings = match embed_all(&chunks, embedder, config.batch_size, &progress).await {
        Ok(embeddings) => embeddings,
        Err(e) => {
            tracing::error!("Failed to embed chunks: {}", e);
            stats.error = Some(e.to_string());
            return Ok(stats);
        }
    };

    let items: Vec<(DocumentChunk, Vec<f32>)> = chunks.into_iter().zip(embeddings).collect();
    match store.add_chunks(embedder.model_name(), &items) {
        Ok(inserted) => {
            stats.inserted = inserted;
            tracing::info!("Added {} chunks to the vector store", inserted);
        }
        Err(e) => {
            tracing::error!("Failed to add chunks to the vector store: {}", e);
            stats.error = Some(e.to_string());
        }
    }

    Ok(stats)
}

async fn embed_all(
    chunks: &[DocumentChunk],
    embedder: &dyn Embedder,
    batch_size: usize,
    progress: &Option<Box<dyn Fn(IngestProgress) + Send + Sync>>,
) -> Result<Vec<Vec<f32>>> {
    let mut embeddings = Vec::with_capacity(chunks.len());

    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let batch_embeddings = embedder.embed_batch(&texts).await?;
        if batch_embeddings.len() != texts.len() {
            return Err(crate::error::RaglineError::Llm(format!(
                "Embedder returned {} vectors for {} texts",
                batch_embeddings.len(),
                texts.len()
            )));
        }
        let expected = embedder.dimensions();
        if let Some(vector) = batch_embeddings
            .iter()
            .find(|v| expected != 0 && v.len() != expected)
        {
            return Err(crate::error::RaglineError::Llm(format!(
                "Embedding has {} dimensions, expected {}",
                vector.len(),
                expected
            )));
        }
        embeddings.extend(batch_embeddings);

        tracing::debug!("Embedded {}/{} chunks", embeddings.len(), chunks.len());
        if let Some(ref cb) = progress {
            cb(IngestProgress {
                total_chunks: chunks.len(),
                embedded_chunks: embeddings.len(),
            });
        }
    }

    Ok(embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingEmbedder, HashEmbedder};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn config_for(source: &Path) -> IngestConfig {
        IngestConfig {
            source_dir: source.to_path_buf(),
            chunk_size: 50,
            chunk_overlap: 10,
            clear_existing: true,
            batch_size: 2,
        }
    }

    #[tokio::test]
    async fn test_ingest_text_files() {
        let source = tempfile::tempdir().unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            source.path().join("rights.txt"),
            "Workers have the right to organize. Unions negotiate contracts. Safety rules apply to every site.",
        )
        .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let progress: Box<dyn Fn(IngestProgress) + Send + Sync> = Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let embedder = HashEmbedder::new(32);
        let stats = ingest(&config_for(source.path()), store_dir.path(), &embedder, Some(progress))
            .await
            .unwrap();

        assert!(stats.succeeded());
        assert_eq!(stats.documents, 1);
        assert!(stats.chunks > 1);
        assert_eq!(stats.inserted, stats.chunks);
        assert!(calls.load(Ordering::SeqCst) >= 1);

        let store = VectorStore::open_dir(store_dir.path()).unwrap();
        assert_eq!(store.count_chunks().unwrap(), stats.chunks);
    }

    #[tokio::test]
    async fn test_ingest_missing_source_dir() {
        let root = tempfile::tempdir().unwrap();
        let store_dir = root.path().join("db");
        let embedder = HashEmbedder::new(32);

        let stats = ingest(&config_for(&root.path().join("nope")), &store_dir, &embedder, None)
            .await
            .unwrap();

        assert!(stats.succeeded());
        assert_eq!(stats.chunks, 0);
        assert_eq!(VectorStore::open_dir(&store_dir).unwrap().count_chunks().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ingest_replaces_previous_store() {
        let source = tempfile::tempdir().unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        let embedder = HashEmbedder::new(32);

        std::fs::write(source.path().join("a.txt"), "First version of the handbook.").unwrap();
        ingest(&config_for(source.path()), store_dir.path(), &embedder, None)
            .await
            .unwrap();

        std::fs::remove_file(source.path().join("a.txt")).unwrap();
        std::fs::write(source.path().join("b.txt"), "Second handbook.").unwrap();
        let stats = ingest(&config_for(source.path()), store_dir.path(), &embedder, None)
            .await
            .unwrap();

        assert!(stats.cleared);
        let store = VectorStore::open_dir(store_dir.path()).unwrap();
        let sources = store.source_stats().unwrap();
        assert_eq!(sources.len(), 1);
        assert!(sources[0].source.ends_with("b.txt"));
    }

    #[tokio::test]
    async fn test_ingest_records_embedding_failure() {
        let source = tempfile::tempdir().unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("a.txt"), "Some text to embed.").unwrap();

        let stats = ingest(&config_for(source.path()), store_dir.path(), &FailingEmbedder, None)
            .await
            .unwrap();

        assert!(!stats.succeeded());
        assert_eq!(stats.inserted, 0);
        assert!(stats.error.unwrap().contains("embedding service unavailable"));
    }

    /// Reports more dimensions than it produces
    struct MisreportingEmbedder(HashEmbedder);

    #[async_trait::async_trait]
    impl Embedder for MisreportingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.0.embed(text).await
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.0.embed_batch(texts).await
        }

        fn dimensions(&self) -> usize {
            16
        }

        fn model_name(&self) -> &str {
            self.0.model_name()
        }
    }

    #[tokio::test]
    async fn test_ingest_records_dimension_mismatch() {
        let source = tempfile::tempdir().unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("a.txt"), "Shift schedules change weekly.").unwrap();

        let embedder = MisreportingEmbedder(HashEmbedder::new(8));
        let stats = ingest(&config_for(source.path()), store_dir.path(), &embedder, None)
            .await
            .unwrap();

        assert_eq!(stats.inserted, 0);
        assert!(stats.error.unwrap().contains("8 dimensions, expected 16"));
    }

    #[tokio::test]
    async fn test_ingest_rejects_bad_window_settings() {
        let source = tempfile::tempdir().unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        let config = IngestConfig {
            chunk_overlap: 50,
            ..config_for(source.path())
        };
        let result = ingest(&config, store_dir.path(), &HashEmbedder::new(8), None).await;
        assert!(result.is_err());
    }
}
