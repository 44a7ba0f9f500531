//! Application context: providers, store and orchestrator built once

use crate::agent::Orchestrator;
use crate::config::{bootstrap_credentials, Config, CredentialStatus};
use crate::error::Result;
use crate::llm::{ChatModel, Embedder, HttpEmbedder, ProviderClient};
use crate::store::{StoreRetriever, VectorStore};
use std::sync::Arc;

/// Shared handles for one running process
pub struct AppContext {
    pub config: Config,
    pub credentials: CredentialStatus,
    pub chat: Arc<dyn ChatModel>,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<VectorStore>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppContext {
    /// Build the context from configuration
    ///
    /// Credential problems are logged and kept in `credentials`; they surface
    /// later as provider call failures rather than stopping startup.
    pub fn bootstrap(mut config: Config) -> Result<Self> {
        let credentials = if config.provider.is_vertex() {
            bootstrap_credentials(&mut config.provider)
        } else {
            tracing::debug!("Explicit provider URL configured; skipping credential bootstrap");
            CredentialStatus::Missing
        };

        let client = Arc::new(ProviderClient::new(config.provider.clone())?);
        let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(client.clone()));
        let store = Arc::new(VectorStore::open_dir(&config.store.data_dir)?);

        tracing::info!(
            model = %config.provider.model,
            embedding_model = %config.provider.embedding_model,
            store = ?config.store.data_dir,
            "Application context ready"
        );

        let mut context = Self::from_parts(config, client, embedder, store);
        context.credentials = credentials;
        Ok(context)
    }

    /// Assemble a context from ready-made parts
    pub fn from_parts(
        config: Config,
        chat: Arc<dyn ChatModel>,
        embedder: Arc<dyn Embedder>,
        store: Arc<VectorStore>,
    ) -> Self {
        let retriever = Arc::new(StoreRetriever::new(store.clone(), embedder.clone()));
        let orchestrator = Arc::new(Orchestrator::new(chat.clone(), retriever));
        Self {
            config,
            credentials: CredentialStatus::Missing,
            chat,
            embedder,
            store,
            orchestrator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HashEmbedder, ScriptedChatModel};

    #[tokio::test]
    async fn test_from_parts_wires_orchestrator() {
        let chat = Arc::new(ScriptedChatModel::new());
        chat.reply_text("ready");
        let context = AppContext::from_parts(
            Config::default(),
            chat,
            Arc::new(HashEmbedder::new(16)),
            Arc::new(VectorStore::open_in_memory().unwrap()),
        );

        let answer = context.orchestrator.run_turn("t", "ping").await.unwrap();
        assert_eq!(answer.text(), "ready");
        assert_eq!(context.store.count_chunks().unwrap(), 0);
    }

    #[test]
    fn test_bootstrap_with_explicit_url() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.provider.url = Some("http://127.0.0.1:9".to_string());
        config.store.data_dir = dir.path().join("db");

        let context = AppContext::bootstrap(config).unwrap();
        assert_eq!(context.credentials, CredentialStatus::Missing);
        assert!(context.store.path().unwrap().exists());
    }
}
