//! Per-thread conversation history

use crate::llm::Message;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Message history of one thread
pub type ThreadHistory = Arc<tokio::sync::Mutex<Vec<Message>>>;

/// In-memory conversation checkpoints keyed by thread id
///
/// Each thread has its own async lock; a turn holds it from the first model
/// call to the final append, so turns on one thread never interleave.
#[derive(Default)]
pub struct ConversationStore {
    threads: Mutex<HashMap<String, ThreadHistory>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// History handle for `thread_id`, created empty on first use
    pub fn thread(&self, thread_id: &str) -> ThreadHistory {
        let mut threads = match self.threads.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        threads
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(Vec::new())))
            .clone()
    }

    /// Snapshot of the messages stored for `thread_id`
    ///
    /// Waits for a turn in progress on that thread to finish.
    pub async fn history(&self, thread_id: &str) -> Vec<Message> {
        let existing = match self.threads.lock() {
            Ok(guard) => guard.get(thread_id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(thread_id).cloned(),
        };
        match existing {
            Some(thread) => thread.lock().await.clone(),
            None => Vec::new(),
        }
    }

    /// Number of threads seen so far
    pub fn thread_count(&self) -> usize {
        match self.threads.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_threads_are_isolated() {
        let store = ConversationStore::new();
        store.thread("a").lock().await.push(Message::user("hello"));

        assert_eq!(store.history("a").await.len(), 1);
        assert!(store.history("b").await.is_empty());
        assert_eq!(store.thread_count(), 1);
    }

    #[tokio::test]
    async fn test_same_thread_shares_history() {
        let store = ConversationStore::new();
        let first = store.thread("t");
        let second = store.thread("t");
        first.lock().await.push(Message::user("one"));
        assert_eq!(second.lock().await.len(), 1);
    }
}
