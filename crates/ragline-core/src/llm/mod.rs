//! LLM integration
//!
//! Provides traits and implementations for:
//! - Chat completion with tool calling, blocking and streamed
//! - Embedding generation via the same external provider
//! - The role-tagged message model shared by the agent and the HTTP surface

mod auth;
mod cache;
mod client;
mod http_embedder;
mod message;
mod traits;
mod wire;

pub use auth::{ProviderAuth, ServiceAccountTokens};
pub use cache::EmbeddingCache;
pub use client::ProviderClient;
pub use http_embedder::HttpEmbedder;
pub use message::{Content, ContentBlock, Message, Role, ToolCall};
pub use traits::*;
