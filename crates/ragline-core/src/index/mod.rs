//! Document ingestion
//!
//! Turns a directory of PDFs and text files into embedded windows in the
//! vector store.

mod chunker;
mod ingest;
mod loader;

pub use chunker::{split_text, TextWindow, CHUNK_OVERLAP_CHARS, CHUNK_SIZE_CHARS};
pub use ingest::{ingest, IngestProgress, IngestStats};
pub use loader::{load_documents, load_file, scan_directory, DocumentKind, SourceDocument};
