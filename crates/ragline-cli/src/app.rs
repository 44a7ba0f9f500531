//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ragline")]
#[command(
    author,
    version,
    about = "Retrieval-augmented chat over your document collection"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Vector store directory
    #[arg(long, global = true, env = "RAGLINE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "cli")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve(ServeArgs),

    /// Rebuild the vector store from source documents
    Ingest(IngestArgs),

    /// Run one conversation turn
    Chat(ChatArgs),

    /// Show vector store status
    Status,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Listen address (overrides config)
    #[arg(long)]
    pub bind: Option<String>,
}

#[derive(Args)]
pub struct IngestArgs {
    /// Directory containing PDF and text files
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Keep the existing store instead of clearing it first
    #[arg(long)]
    pub keep: bool,
}

#[derive(Args)]
pub struct ChatArgs {
    /// Conversation thread id
    #[arg(long, short)]
    pub thread: String,

    /// Print the answer as it is generated
    #[arg(long)]
    pub stream: bool,

    /// Prompt text
    #[arg(required = true, num_args = 1..)]
    pub prompt: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Cli,
    Json,
}
