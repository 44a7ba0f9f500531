//! Chunk storage and nearest-neighbour lookup

use super::vectors::{bytes_to_embedding, cosine_similarity, embedding_to_bytes};
use super::VectorStore;
use crate::error::{RaglineError, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A window of document text plus where it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    /// Origin file
    pub source: String,
    /// Zero-based page for paged sources (PDF)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    /// Byte offset of the window within the source text (or page)
    pub start_index: usize,
    pub text: String,
}

impl DocumentChunk {
    pub fn new(source: impl Into<String>, start_index: usize, text: impl Into<String>) -> Self {
        Self::on_page(source, None, start_index, text)
    }

    pub fn on_page(
        source: impl Into<String>,
        page: Option<usize>,
        start_index: usize,
        text: impl Into<String>,
    ) -> Self {
        let source = source.into();
        let text = text.into();
        let id = chunk_id(&source, page, start_index, &text);
        Self {
            id,
            source,
            page,
            start_index,
            text,
        }
    }

    /// Source metadata as shown to the model
    pub fn metadata(&self) -> serde_json::Value {
        let mut metadata = serde_json::json!({
            "source": self.source,
            "start_index": self.start_index,
        });
        if let Some(page) = self.page {
            metadata["page"] = page.into();
        }
        metadata
    }
}

/// Stable chunk identifier (SHA-256 over origin, page, offset and text)
pub fn chunk_id(source: &str, page: Option<usize>, start_index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    match page {
        Some(page) => {
            hasher.update([1u8]);
            hasher.update(page.to_le_bytes());
        }
        None => hasher.update([0u8]),
    }
    hasher.update(start_index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Chunk returned by a similarity query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// Per-source chunk counts
#[derive(Debug, Clone, Serialize)]
pub struct SourceStats {
    pub source: String,
    pub chunks: usize,
}

impl VectorStore {
    /// Insert chunks with their embeddings in one transaction
    pub fn add_chunks(&self, model: &str, items: &[(DocumentChunk, Vec<f32>)]) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let dimensions = items[0].1.len();
        if let Some((bad, embedding)) = items.iter().find(|(_, e)| e.len() != dimensions) {
            return Err(RaglineError::Index(format!(
                "Embedding for chunk {} has {} dimensions, expected {}",
                bad.id,
                embedding.len(),
                dimensions
            )));
        }

        self.check_model_dimensions(model, dimensions)?;

        let now = Utc::now().to_rfc3339();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut insert_chunk = tx.prepare(
                "INSERT OR REPLACE INTO chunks (id, source, page, start_index, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            let mut insert_embedding = tx.prepare(
                "INSERT OR REPLACE INTO embeddings (chunk_id, model, embedding) VALUES (?1, ?2, ?3)",
            )?;

            for (chunk, embedding) in items {
                insert_chunk.execute(params![
                    chunk.id,
                    chunk.source,
                    chunk.page.map(|p| p as i64),
                    chunk.start_index as i64,
                    chunk.text,
                    now
                ])?;
                insert_embedding.execute(params![
                    chunk.id,
                    model,
                    embedding_to_bytes(embedding)
                ])?;
            }

            tx.execute(
                "INSERT INTO model_metadata (model, dimensions, created_at, last_used_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(model) DO UPDATE SET last_used_at = ?3",
                params![model, dimensions as i64, now],
            )?;
        }
        tx.commit()?;

        Ok(items.len())
    }

    fn check_model_dimensions(&self, model: &str, dimensions: usize) -> Result<()> {
        match self.get_model_dimensions(model)? {
            Some(stored) if stored != dimensions => Err(RaglineError::Index(format!(
                "Model {} was stored with {} dimensions, got {}",
                model, stored, dimensions
            ))),
            _ => Ok(()),
        }
    }

    /// Get stored model dimensions
    pub fn get_model_dimensions(&self, model: &str) -> Result<Option<usize>> {
        let conn = self.conn()?;
        let dims = conn
            .query_row(
                "SELECT dimensions FROM model_metadata WHERE model = ?1",
                params![model],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(dims.map(|d| d as usize))
    }

    /// Most recently used embedding model and its dimensions
    pub fn current_model(&self) -> Result<Option<(String, usize)>> {
        let conn = self.conn()?;
        let model = conn
            .query_row(
                "SELECT model, dimensions FROM model_metadata ORDER BY last_used_at DESC LIMIT 1",
                [],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)),
            )
            .optional()?;
        Ok(model)
    }

    /// Top `k` chunks by cosine similarity to `query_embedding`, best first
    pub fn similarity_search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.source, c.page, c.start_index, c.text, e.embedding
             FROM chunks c
             JOIN embeddings e ON e.chunk_id = c.id",
        )?;

        let mut scored = stmt
            .query_map([], |row| {
                let embedding_bytes: Vec<u8> = row.get(5)?;
                Ok((
                    DocumentChunk {
                        id: row.get(0)?,
                        source: row.get(1)?,
                        page: row.get::<_, Option<i64>>(2)?.map(|p| p as usize),
                        start_index: row.get::<_, i64>(3)? as usize,
                        text: row.get(4)?,
                    },
                    bytes_to_embedding(&embedding_bytes),
                ))
            })?
            .map(|row| {
                row.map(|(chunk, embedding)| ScoredChunk {
                    score: cosine_similarity(query_embedding, &embedding),
                    chunk,
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        Ok(scored)
    }

    /// Delete every chunk, embedding and model record
    pub fn clear(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "DELETE FROM embeddings;
             DELETE FROM chunks;
             DELETE FROM model_metadata;",
        )?;
        Ok(())
    }

    /// Total number of stored chunks
    pub fn count_chunks(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Chunk counts grouped by source file
    pub fn source_stats(&self) -> Result<Vec<SourceStats>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT source, COUNT(*) FROM chunks GROUP BY source ORDER BY source",
        )?;
        let stats = stmt
            .query_map([], |row| {
                Ok(SourceStats {
                    source: row.get(0)?,
                    chunks: row.get::<_, i64>(1)? as usize,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(items: &[(&str, usize, &str, Vec<f32>)]) -> VectorStore {
        let store = VectorStore::open_in_memory().unwrap();
        let items: Vec<_> = items
            .iter()
            .map(|(source, start, text, emb)| (DocumentChunk::new(*source, *start, *text), emb.clone()))
            .collect();
        store.add_chunks("test-model", &items).unwrap();
        store
    }

    #[test]
    fn test_chunk_id_is_stable_and_positional() {
        assert_eq!(chunk_id("a.pdf", None, 0, "x"), chunk_id("a.pdf", None, 0, "x"));
        assert_ne!(chunk_id("a.pdf", None, 0, "x"), chunk_id("a.pdf", None, 1, "x"));
        assert_ne!(chunk_id("a.pdf", Some(0), 0, "x"), chunk_id("a.pdf", Some(1), 0, "x"));
        assert_ne!(chunk_id("a.pdf", None, 0, "x"), chunk_id("a.pdf", Some(0), 0, "x"));
        assert_eq!(chunk_id("a.pdf", None, 0, "x").len(), 64);
    }

    #[test]
    fn test_similarity_search_orders_and_caps() {
        let store = store_with(&[
            ("a.pdf", 0, "north", vec![1.0, 0.0]),
            ("a.pdf", 10, "north-east", vec![0.7, 0.7]),
            ("b.pdf", 0, "east", vec![0.0, 1.0]),
            ("b.pdf", 10, "south", vec![-1.0, 0.0]),
            ("c.pdf", 0, "west", vec![0.0, -1.0]),
        ]);

        let results = store.similarity_search(&[1.0, 0.0], 4).unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].chunk.text, "north");
        assert_eq!(results[1].chunk.text, "north-east");
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(results.iter().all(|r| r.chunk.text != "south"));
    }

    #[test]
    fn test_similarity_search_empty_store() {
        let store = VectorStore::open_in_memory().unwrap();
        assert!(store.similarity_search(&[1.0, 0.0], 4).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let store = store_with(&[("a.pdf", 0, "x", vec![1.0, 0.0])]);
        let err = store
            .add_chunks("test-model", &[(DocumentChunk::new("b.pdf", 0, "y"), vec![1.0, 0.0, 0.0])])
            .unwrap_err();
        assert!(matches!(err, RaglineError::Index(_)));
        assert_eq!(store.get_model_dimensions("test-model").unwrap(), Some(2));
    }

    #[test]
    fn test_counts_and_model_info() {
        let store = store_with(&[
            ("a.pdf", 0, "x", vec![1.0]),
            ("a.pdf", 5, "y", vec![1.0]),
            ("b.pdf", 0, "z", vec![1.0]),
        ]);
        assert_eq!(store.count_chunks().unwrap(), 3);
        let stats = store.source_stats().unwrap();
        assert_eq!(stats[0].source, "a.pdf");
        assert_eq!(stats[0].chunks, 2);
        assert_eq!(
            store.current_model().unwrap(),
            Some(("test-model".to_string(), 1))
        );
    }

    #[test]
    fn test_clear_empties_store() {
        let store = store_with(&[("a.pdf", 0, "x", vec![1.0])]);
        store.clear().unwrap();
        assert_eq!(store.count_chunks().unwrap(), 0);
        assert!(store.current_model().unwrap().is_none());
    }

    #[test]
    fn test_page_round_trips_into_metadata() {
        let store = VectorStore::open_in_memory().unwrap();
        store
            .add_chunks(
                "m",
                &[
                    (DocumentChunk::on_page("hb.pdf", Some(3), 40, "paged"), vec![1.0, 0.0]),
                    (DocumentChunk::new("notes.txt", 0, "flat"), vec![0.0, 1.0]),
                ],
            )
            .unwrap();

        let results = store.similarity_search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results[0].chunk.page, Some(3));
        assert_eq!(
            results[0].chunk.metadata(),
            serde_json::json!({"source": "hb.pdf", "page": 3, "start_index": 40})
        );
        assert_eq!(results[1].chunk.page, None);
        assert!(results[1].chunk.metadata().get("page").is_none());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = VectorStore::open_dir(dir.path()).unwrap();
            store
                .add_chunks("m", &[(DocumentChunk::new("a.pdf", 0, "kept"), vec![0.5, 0.5])])
                .unwrap();
        }
        let store = VectorStore::open_dir(dir.path()).unwrap();
        let results = store.similarity_search(&[0.5, 0.5], 4).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.text, "kept");
    }
}
