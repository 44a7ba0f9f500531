//! CLI command handlers

pub mod chat;
pub mod ingest;
pub mod serve;
pub mod status;
