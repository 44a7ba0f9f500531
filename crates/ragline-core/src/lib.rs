//! Ragline Core Library
//!
//! Retrieval-augmented chat over a local document collection.
//!
//! # Features
//! - PDF and text ingestion into overlapping, embedded windows
//! - SQLite vector store with cosine nearest-neighbour lookup
//! - Conversational agent that decides per turn whether to retrieve
//! - OpenAI-compatible provider client (Vertex AI or self-hosted), blocking
//!   and streamed

pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod index;
pub mod llm;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use agent::{Decision, Orchestrator, TurnEvent};
pub use config::{Config, CredentialStatus, IngestConfig, ProviderConfig, ServerConfig, StoreConfig};
pub use context::AppContext;
pub use error::{Error, RaglineError, Result};
pub use index::{ingest, IngestProgress, IngestStats};
pub use llm::{
    ChatModel, Content, ContentBlock, Embedder, HttpEmbedder, Message, ProviderClient, Role,
    ToolCall,
};
pub use store::{DocumentChunk, Retriever, ScoredChunk, StoreRetriever, VectorStore};

/// File name of the SQLite store inside the data directory
pub const STORE_FILE_NAME: &str = "index.sqlite";

/// Default cache directory name
pub const CACHE_DIR_NAME: &str = "ragline";

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "ragline";
