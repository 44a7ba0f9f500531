//! HTTP-based embedder using the external provider

use super::{Embedder, ProviderClient};
use crate::config::ProviderConfig;
use crate::error::{RaglineError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Embedder backed by the provider's `/embeddings` endpoint
pub struct HttpEmbedder {
    client: Arc<ProviderClient>,
}

impl HttpEmbedder {
    /// Create from provider client (shared with the chat model)
    pub fn new(client: Arc<ProviderClient>) -> Self {
        Self { client }
    }

    /// Create from configuration
    pub fn from_config(config: ProviderConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(ProviderClient::new(config)?)))
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.client.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| RaglineError::Llm("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.client.embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        self.client.embedding_dimensions()
    }

    fn model_name(&self) -> &str {
        self.client.embedding_model()
    }
}
