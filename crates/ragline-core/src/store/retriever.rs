//! Query-time retrieval: embed the query, scan the store

use super::{ScoredChunk, VectorStore};
use crate::error::Result;
use crate::llm::Embedder;
use async_trait::async_trait;
use std::sync::Arc;

/// Similarity search over some text collection
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Best `k` chunks for `query`, best first
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>>;
}

/// Retriever over the persisted vector store
pub struct StoreRetriever {
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
}

impl StoreRetriever {
    pub fn new(store: Arc<VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }
}

#[async_trait]
impl Retriever for StoreRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let query_embedding = self.embedder.embed(query).await?;
        let results = self.store.similarity_search(&query_embedding, k)?;
        tracing::debug!(query = %query, hits = results.len(), "Similarity search");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DocumentChunk;
    use crate::testing::HashEmbedder;

    #[tokio::test]
    async fn test_retrieves_closest_text() {
        let embedder = Arc::new(HashEmbedder::new(256));
        let store = Arc::new(VectorStore::open_in_memory().unwrap());

        let texts = [
            "The Founding Titan can control other titans",
            "Minimum wage rules for warehouse workers",
            "Union contracts and collective bargaining",
        ];
        let mut items = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            items.push((
                DocumentChunk::new("doc.txt", i * 100, *text),
                embedder.embed(text).await.unwrap(),
            ));
        }
        store.add_chunks(embedder.model_name(), &items).unwrap();

        let retriever = StoreRetriever::new(store, embedder);
        let results = retriever.retrieve("Founding Titan", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].chunk.text.contains("Founding Titan"));
    }
}
