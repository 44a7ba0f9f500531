//! Vector store
//!
//! SQLite-backed storage for document windows and their embeddings:
//! - chunk rows with source metadata
//! - little-endian f32 embedding BLOBs
//! - brute-force cosine nearest-neighbour lookup

mod chunks;
mod retriever;
mod schema;
pub mod vectors;

pub use chunks::{chunk_id, DocumentChunk, ScoredChunk, SourceStats};
pub use retriever::{Retriever, StoreRetriever};
pub use schema::{clear_store_dir, VectorStore};
