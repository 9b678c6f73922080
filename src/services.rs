//! Wires the persistent store and every component into one graph.

use crate::config::Config;
use crate::context::{DocumentContextCache, DocumentLibrary, DocumentProcessor};
use crate::conversation::ConversationStore;
use crate::orchestrator::Orchestrator;
use crate::store::{KvStore, SqliteKvStore};
use crate::transport::{HttpChatClient, SocketConnection, TransportClient};
use crate::usage::UsageMeter;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

pub struct Services {
    pub config: Config,
    pub store: Arc<dyn KvStore>,
    pub usage: Arc<UsageMeter>,
    pub documents: Arc<DocumentLibrary>,
    pub context: Arc<DocumentContextCache>,
    pub conversations: Arc<ConversationStore>,
    pub processor: Option<DocumentProcessor>,
    pub socket: Option<SocketConnection>,
    pub orchestrator: Orchestrator,
}

impl Services {
    /// Open the SQLite store named by the config and build every component.
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        let path = config.resolved_storage_path();
        let store = SqliteKvStore::open(&path, &config.profile)
            .await
            .with_context(|| format!("open store at {}", path.display()))?;
        Ok(Self::with_store(config, Arc::new(store)))
    }

    pub fn with_store(config: Config, store: Arc<dyn KvStore>) -> Self {
        let usage = Arc::new(UsageMeter::new(Arc::clone(&store), config.usage.clone()));
        let documents = Arc::new(DocumentLibrary::new(
            Arc::clone(&store),
            config.context.document_quota_bytes,
        ));
        let context = Arc::new(DocumentContextCache::new(
            Arc::clone(&store),
            documents.clone(),
            &config.context,
        ));
        let conversations = Arc::new(ConversationStore::new(
            Arc::clone(&store),
            config.conversations.retention_cap,
        ));
        let processor = config.context.processor_url.as_deref().map(|url| {
            DocumentProcessor::new(
                url,
                config.api_key.as_deref(),
                config.transport.request_timeout_secs,
            )
        });

        let socket = SocketConnection::from_config(&config.transport);
        let http = HttpChatClient::from_config(
            &config.transport,
            config.api_key.as_deref(),
            &config.model,
        );
        let transport = TransportClient::new(
            socket.clone(),
            http,
            Duration::from_secs(config.transport.turn_timeout_secs),
        );
        let orchestrator = Orchestrator::new(
            Arc::clone(&usage),
            Arc::clone(&context),
            Arc::clone(&conversations),
            transport,
        );

        Self {
            config,
            store,
            usage,
            documents,
            context,
            conversations,
            processor,
            socket,
            orchestrator,
        }
    }

    /// Bring the streaming socket up when one is configured. Failure is not
    /// fatal: turns fall back to HTTP.
    pub async fn connect(&self) {
        let Some(socket) = &self.socket else {
            return;
        };
        if let Err(error) = socket.connect().await {
            tracing::warn!(url = socket.url(), "streaming socket unavailable, using http: {error}");
        }
    }

    /// Flush background work and close the socket.
    pub async fn shutdown(&self) {
        self.orchestrator.flush_background().await;
        if let Some(socket) = &self.socket {
            socket.disconnect().await;
        }
    }
}
