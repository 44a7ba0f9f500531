//! Shared handler state

use ragline_core::AppContext;
use std::sync::atomic::{AtomicU64, Ordering};

/// State handed to every request handler
pub struct AppState {
    pub context: AppContext,
    dropped_fragments: AtomicU64,
}

impl AppState {
    pub fn new(context: AppContext) -> Self {
        Self {
            context,
            dropped_fragments: AtomicU64::new(0),
        }
    }

    /// Stream fragments skipped because they could not be rendered
    pub fn dropped_fragments(&self) -> u64 {
        self.dropped_fragments.load(Ordering::Relaxed)
    }

    pub(crate) fn record_dropped_fragment(&self) -> u64 {
        self.dropped_fragments.fetch_add(1, Ordering::Relaxed) + 1
    }
}
