//! HTTP client for the external chat/embedding provider
//!
//! Speaks the OpenAI-compatible protocol, which both Vertex AI's `openapi`
//! endpoint and self-hosted servers (vLLM, etc.) accept.

use super::auth::ProviderAuth;
use super::cache::EmbeddingCache;
use super::message::Message;
use super::traits::{ChatDelta, ChatModel, ChatStream, ToolSpec};
use super::wire::{
    extract_api_error_message, ChatChunk, ChatRequest, ChatResponse, EmbedRequest, EmbedResponse,
    WireMessage, WireTool,
};
use crate::config::ProviderConfig;
use crate::error::{RaglineError, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{future, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// OpenAI-compatible provider client
pub struct ProviderClient {
    http_client: reqwest::Client,
    config: ProviderConfig,
    auth: ProviderAuth,
    embedding_dimensions: AtomicUsize,
    cache: Arc<EmbeddingCache>,
}

impl ProviderClient {
    /// Create new client from configuration
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(RaglineError::Http)?;

        let embedding_dimensions = AtomicUsize::new(config.embedding_dimensions.unwrap_or(0));

        let auth = ProviderAuth::from_config(&config);

        Ok(Self {
            http_client,
            config,
            auth,
            embedding_dimensions,
            cache: Arc::new(EmbeddingCache::new()),
        })
    }

    pub fn embedding_model(&self) -> &str {
        &self.config.embedding_model
    }

    pub fn embedding_dimensions(&self) -> usize {
        self.embedding_dimensions.load(Ordering::Relaxed)
    }

    fn build_chat_request(&self, messages: &[Message], tools: &[ToolSpec], stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.config.wire_model(&self.config.model).into_owned(),
            messages: messages.iter().map(WireMessage::from).collect(),
            tools: tools.iter().map(WireTool::from).collect(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream,
        }
    }

    async fn post_json<T: serde::Serialize>(
        &self,
        url: &str,
        body: &T,
        what: &str,
    ) -> Result<reqwest::Response> {
        let mut req = self.http_client.post(url).json(body);

        if let Some(token) = self.auth.bearer_token(&self.http_client).await? {
            req = req.bearer_auth(token);
        }

        let response = req.send().await.map_err(RaglineError::Http)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = extract_api_error_message(&body).unwrap_or(body);
            return Err(RaglineError::ExternalError(format!(
                "{} service error (HTTP {}): {}",
                what, status, detail
            )));
        }

        Ok(response)
    }

    /// Embed texts, serving repeats from the in-memory cache
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = &self.config.embedding_model;

        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut uncached_texts = Vec::new();
        let mut uncached_indices = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            if let Some(embedding) = self.cache.lookup(model, text) {
                results.push(Some(embedding));
                continue;
            }
            results.push(None);
            uncached_texts.push(text.clone());
            uncached_indices.push(i);
        }

        if uncached_texts.is_empty() {
            tracing::debug!("All {} embeddings from cache", texts.len());
            return Ok(results.into_iter().flatten().collect());
        }

        tracing::debug!(
            "Embedding batch: {} cached, {} to fetch",
            texts.len() - uncached_texts.len(),
            uncached_texts.len()
        );

        let request = EmbedRequest {
            model: self.config.wire_model(model).into_owned(),
            input: uncached_texts.clone(),
        };

        let url = self.config.embeddings_url()?;
        let response = self.post_json(&url, &request, "Embedding").await?;
        let mut embed_response: EmbedResponse = response.json().await?;

        if embed_response.data.len() != uncached_texts.len() {
            return Err(RaglineError::Llm(format!(
                "Embedding service returned {} vectors for {} inputs",
                embed_response.data.len(),
                uncached_texts.len()
            )));
        }

        // Providers may return data out of order when they carry an index
        embed_response
            .data
            .sort_by_key(|d| d.index.unwrap_or(usize::MAX));

        for (i, data) in embed_response.data.into_iter().enumerate() {
            if self.embedding_dimensions() == 0 {
                self.embedding_dimensions
                    .store(data.embedding.len(), Ordering::Relaxed);
            }

            self.cache.store(model, &uncached_texts[i], &data.embedding);
            results[uncached_indices[i]] = Some(data.embedding);
        }

        results
            .into_iter()
            .map(|r| r.ok_or_else(|| RaglineError::Llm("Missing embedding in response".into())))
            .collect()
    }
}

/// Decode one streamed SSE payload
fn parse_stream_event(data: &str) -> Result<Option<ChatDelta>> {
    let json: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| RaglineError::Llm(format!("SSE parsing error: {}, data: {}", e, data)))?;

    if let Some(error) = json.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .or_else(|| error.as_str())
            .unwrap_or("An error occurred during streaming");
        return Err(RaglineError::ExternalError(format!("SSE API error: {}", message)));
    }

    let chunk: ChatChunk = serde_json::from_value(json)?;
    Ok(chunk.into_delta())
}

#[async_trait]
impl ChatModel for ProviderClient {
    async fn complete(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Message> {
        let request = self.build_chat_request(messages, tools, false);
        let url = self.config.chat_url()?;

        let response = self.post_json(&url, &request, "LLM").await?;
        let chat_response: ChatResponse = response.json().await?;

        let message = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RaglineError::Llm("No response from LLM".to_string()))?
            .message
            .into_message();

        Ok(message)
    }

    async fn stream(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<ChatStream> {
        let request = self.build_chat_request(messages, tools, true);
        let url = self.config.chat_url()?;

        let response = self.post_json(&url, &request, "LLM").await?;

        let stream = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| {
                future::ready(!matches!(event, Ok(event) if event.data.trim() == "[DONE]"))
            })
            .filter_map(|event| {
                future::ready(match event {
                    Ok(event) => parse_stream_event(&event.data).transpose(),
                    Err(e) => Some(Err(RaglineError::Llm(format!("SSE stream error: {}", e)))),
                })
            })
            .boxed();

        Ok(stream)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
