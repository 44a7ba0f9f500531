//! In-memory embedding cache
//!
//! Repeated questions embed the same query text and re-ingesting a corpus
//! embeds the same windows. Chat completions are never cached since replies
//! depend on conversation state.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

const DEFAULT_TTL: Duration = Duration::from_secs(3600);
const DEFAULT_CAPACITY: usize = 10_000;

type CacheKey = [u8; 32];

struct CachedVector {
    vector: Vec<f32>,
    stored_at: Instant,
}

/// Vectors keyed by (model, text), expiring after a fixed TTL
pub struct EmbeddingCache {
    vectors: RwLock<HashMap<CacheKey, CachedVector>>,
    ttl: Duration,
    capacity: usize,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_TTL, DEFAULT_CAPACITY)
    }

    pub fn with_limits(ttl: Duration, capacity: usize) -> Self {
        Self {
            vectors: RwLock::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Cached vector for `text` under `model`, if still fresh
    pub fn lookup(&self, model: &str, text: &str) -> Option<Vec<f32>> {
        let vectors = self.vectors.read().ok()?;
        let cached = vectors.get(&cache_key(model, text))?;
        (cached.stored_at.elapsed() < self.ttl).then(|| cached.vector.clone())
    }

    pub fn store(&self, model: &str, text: &str, vector: &[f32]) {
        let Ok(mut vectors) = self.vectors.write() else {
            return;
        };

        if vectors.len() >= self.capacity {
            let ttl = self.ttl;
            vectors.retain(|_, cached| cached.stored_at.elapsed() < ttl);
        }
        // Still full of fresh entries: start over rather than grow unbounded
        if vectors.len() >= self.capacity {
            tracing::debug!("Embedding cache full, dropping {} vectors", vectors.len());
            vectors.clear();
        }

        vectors.insert(
            cache_key(model, text),
            CachedVector {
                vector: vector.to_vec(),
                stored_at: Instant::now(),
            },
        );
    }

    /// Number of stored vectors, expired ones included
    pub fn len(&self) -> usize {
        self.vectors.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}

fn cache_key(model: &str, text: &str) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    hasher.finalize().into()
}
