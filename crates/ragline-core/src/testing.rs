//! Deterministic stand-ins for the external provider
//!
//! Available to this crate's tests and, with the `testing` feature, to
//! downstream crates.

use crate::error::{RaglineError, Result};
use crate::llm::{
    ChatDelta, ChatModel, ChatStream, Content, Embedder, Message, ToolCall, ToolCallDelta,
    ToolSpec,
};
use async_trait::async_trait;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Bag-of-words embedder: texts sharing words get similar vectors
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(&self, word: &str) -> usize {
        let digest = Sha256::digest(word.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(bytes) % self.dimensions as u64) as usize
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            vector[self.bucket(&word.to_lowercase())] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "hash-embedder"
    }
}

/// Embedder whose every call fails
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RaglineError::ExternalError(
            "embedding service unavailable".to_string(),
        ))
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(RaglineError::ExternalError(
            "embedding service unavailable".to_string(),
        ))
    }

    fn dimensions(&self) -> usize {
        0
    }

    fn model_name(&self) -> &str {
        "failing-embedder"
    }
}

/// One queued model response
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Reply(Message),
    /// The call itself fails
    Fail(String),
    /// Streams `partial` and then fails; `complete` fails outright
    Interrupted { partial: String, error: String },
}

/// A prompt the scripted model received
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
    pub streamed: bool,
}

/// Chat model answering from a queue of canned replies
#[derive(Default)]
pub struct ScriptedChatModel {
    replies: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedChatModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reply: ScriptedReply) -> &Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
        self
    }

    /// Queue a plain text answer
    pub fn reply_text(&self, text: &str) -> &Self {
        self.push(ScriptedReply::Reply(Message::assistant(text)))
    }

    /// Queue a request to call the retrieve tool with `query`
    pub fn reply_retrieve(&self, query: &str) -> &Self {
        let call = ToolCall {
            id: format!("call_{}", self.queued() + self.calls().len()),
            name: "retrieve".to_string(),
            arguments: serde_json::json!({ "query": query }),
        };
        self.push(ScriptedReply::Reply(Message::assistant_tool_calls(
            "",
            vec![call],
        )))
    }

    pub fn fail(&self, error: &str) -> &Self {
        self.push(ScriptedReply::Fail(error.to_string()))
    }

    /// Prompts received so far, oldest first
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Replies still waiting to be consumed
    pub fn queued(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or_default()
    }

    fn next(&self, messages: &[Message], tools: &[ToolSpec], streamed: bool) -> ScriptedReply {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                messages: messages.to_vec(),
                tools: tools.iter().map(|t| t.name.clone()).collect(),
                streamed,
            });
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .unwrap_or_else(|| ScriptedReply::Fail("no scripted reply left".to_string()))
    }
}

/// Split text into word-sized deltas, keeping separators
fn text_deltas(text: &str) -> Vec<Result<ChatDelta>> {
    text.split_inclusive(' ')
        .map(|piece| {
            Ok(ChatDelta {
                content: Some(Content::Text(piece.to_string())),
                tool_calls: Vec::new(),
            })
        })
        .collect()
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn complete(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<Message> {
        match self.next(messages, tools, false) {
            ScriptedReply::Reply(message) => Ok(message),
            ScriptedReply::Fail(error) | ScriptedReply::Interrupted { error, .. } => {
                Err(RaglineError::ExternalError(error))
            }
        }
    }

    async fn stream(&self, messages: &[Message], tools: &[ToolSpec]) -> Result<ChatStream> {
        let items = match self.next(messages, tools, true) {
            ScriptedReply::Reply(message) => {
                let mut items = match &message.content {
                    Content::Text(text) => text_deltas(text),
                    blocks => vec![Ok(ChatDelta {
                        content: Some(blocks.clone()),
                        tool_calls: Vec::new(),
                    })],
                };
                if message.has_tool_calls() {
                    items.push(Ok(ChatDelta {
                        content: None,
                        tool_calls: message
                            .tool_calls
                            .iter()
                            .enumerate()
                            .map(|(index, call)| ToolCallDelta {
                                index,
                                id: Some(call.id.clone()),
                                name: Some(call.name.clone()),
                                arguments: Some(call.arguments.to_string()),
                            })
                            .collect(),
                    }));
                }
                items
            }
            ScriptedReply::Fail(error) => return Err(RaglineError::ExternalError(error)),
            ScriptedReply::Interrupted { partial, error } => {
                let mut items = text_deltas(&partial);
                items.push(Err(RaglineError::ExternalError(error)));
                items
            }
        };
        Ok(futures::stream::iter(items).boxed())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
