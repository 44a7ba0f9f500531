//! Provider trait definitions

use super::message::{Content, Message, ToolCall};
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Embedding generation trait
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for batch of texts
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get embedding dimensions (0 while still unknown)
    fn dimensions(&self) -> usize;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Tool the chat model may call, described by a JSON schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Incremental piece of a streamed completion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatDelta {
    /// New content, if the chunk carried any
    pub content: Option<Content>,
    /// Partial tool calls keyed by their position in the reply
    pub tool_calls: Vec<ToolCallDelta>,
}

/// Partial tool call; name and arguments arrive in pieces
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// Stream of completion deltas
pub type ChatStream = BoxStream<'static, Result<ChatDelta>>;

/// Chat completion trait
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Complete the conversation, optionally offering tools
    async fn complete(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Message>;

    /// Complete the conversation as a stream of deltas
    async fn stream(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<ChatStream>;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Folds streamed deltas back into a complete assistant message
#[derive(Debug, Default)]
pub struct DeltaAccumulator {
    text: String,
    blocks: Vec<super::message::ContentBlock>,
    /// Keyed by the provider's call index, which need not be dense
    calls: BTreeMap<usize, PendingCall>,
}

#[derive(Debug, Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

impl DeltaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: &ChatDelta) {
        match &delta.content {
            Some(Content::Text(text)) => self.text.push_str(text),
            Some(Content::Blocks(blocks)) => self.blocks.extend(blocks.iter().cloned()),
            None => {}
        }

        for call in &delta.tool_calls {
            let pending = self.calls.entry(call.index).or_default();
            if let Some(ref id) = call.id {
                pending.id = id.clone();
            }
            if let Some(ref name) = call.name {
                pending.name.push_str(name);
            }
            if let Some(ref args) = call.arguments {
                pending.arguments.push_str(args);
            }
        }
    }

    /// Build the final message; argument JSON that fails to parse is kept as a string
    pub fn finish(self) -> Message {
        let content = if self.blocks.is_empty() {
            Content::Text(self.text)
        } else {
            let mut blocks = self.blocks;
            if !self.text.is_empty() {
                blocks.insert(0, super::message::ContentBlock::Text { text: self.text });
            }
            Content::Blocks(blocks)
        };

        let tool_calls: Vec<ToolCall> = self
            .calls
            .into_values()
            .filter(|c| !c.name.is_empty())
            .enumerate()
            .map(|(i, c)| ToolCall {
                id: if c.id.is_empty() {
                    format!("call_{}", i)
                } else {
                    c.id
                },
                name: c.name,
                arguments: parse_arguments(&c.arguments),
            })
            .collect();

        Message::assistant_tool_calls(content, tool_calls)
    }
}

/// Decode tool-call argument text; empty means no arguments
pub fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}
