//! Progress reporting for ingestion

use ragline_core::IngestProgress;
use std::io::{self, Write};

/// Single-line embedding progress on stderr
pub fn report(progress: IngestProgress) {
    let pct = if progress.total_chunks > 0 {
        progress.embedded_chunks as f64 / progress.total_chunks as f64 * 100.0
    } else {
        100.0
    };
    eprint!(
        "\rEmbedding: {}/{} chunks ({:.0}%)   ",
        progress.embedded_chunks, progress.total_chunks, pct
    );
    io::stderr().flush().ok();
}
