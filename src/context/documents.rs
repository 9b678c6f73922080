use super::detection::DocumentKind;
use crate::error::{DocumentError, StorageError};
use crate::store::{KvStore, get_json, keys, set_json};
use crate::utils::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DocumentError>> + Send + 'a>>;

/// A stored personal document, already reduced to plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: DocumentKind,
    pub content: String,
    /// The designated app-context document is always injected first.
    #[serde(default)]
    pub is_app_context: bool,
    pub added_at: DateTime<Utc>,
}

impl Document {
    pub fn size_bytes(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Input for [`DocumentLibrary::save`].
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub name: String,
    pub kind: DocumentKind,
    pub content: String,
    pub is_app_context: bool,
}

/// Where the context cache reads documents from.
pub trait DocumentSource: Send + Sync {
    fn knowledge_sharing_enabled(&self) -> SourceFuture<'_, bool>;

    /// Documents in source (insertion) order.
    fn documents(&self) -> SourceFuture<'_, Vec<Document>>;
}

/// KV-backed document store with a total byte quota.
pub struct DocumentLibrary {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    quota_bytes: u64,
    write_lock: Mutex<()>,
}

impl DocumentLibrary {
    pub fn new(store: Arc<dyn KvStore>, quota_bytes: u64) -> Self {
        Self::with_clock(store, quota_bytes, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn KvStore>, quota_bytes: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            quota_bytes,
            write_lock: Mutex::new(()),
        }
    }

    pub fn quota_bytes(&self) -> u64 {
        self.quota_bytes
    }

    /// Persist a document. Rejected with `QuotaExceeded` before anything is
    /// written when the library would grow past its quota.
    pub async fn save(&self, new: NewDocument) -> Result<Document, DocumentError> {
        let _guard = self.write_lock.lock().await;

        let mut index = self.load_index().await?;
        let existing = self.load_all(&index).await?;
        let used_bytes: u64 = existing.iter().map(Document::size_bytes).sum();
        let requested_bytes = new.content.len() as u64;
        if used_bytes + requested_bytes > self.quota_bytes {
            return Err(DocumentError::QuotaExceeded {
                used_bytes,
                requested_bytes,
                limit_bytes: self.quota_bytes,
            });
        }

        // Only one document may carry the app-context flag.
        if new.is_app_context {
            for mut previous in existing.into_iter().filter(|doc| doc.is_app_context) {
                previous.is_app_context = false;
                set_json(self.store.as_ref(), &keys::document(&previous.id), &previous).await?;
            }
        }

        let document = Document {
            id: uuid::Uuid::new_v4().to_string(),
            name: new.name,
            kind: new.kind,
            content: new.content,
            is_app_context: new.is_app_context,
            added_at: self.clock.now(),
        };
        set_json(self.store.as_ref(), &keys::document(&document.id), &document).await?;
        index.push(document.id.clone());
        set_json(self.store.as_ref(), keys::DOCUMENT_INDEX, &index).await?;

        tracing::info!(
            id = %document.id,
            bytes = requested_bytes,
            "saved document {}",
            document.name
        );
        Ok(document)
    }

    pub async fn get(&self, id: &str) -> Result<Document, DocumentError> {
        get_json::<Document>(self.store.as_ref(), &keys::document(id))
            .await?
            .ok_or_else(|| DocumentError::NotFound(id.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<Document>, DocumentError> {
        let index = self.load_index().await?;
        Ok(self.load_all(&index).await?)
    }

    pub async fn remove(&self, id: &str) -> Result<Document, DocumentError> {
        let _guard = self.write_lock.lock().await;

        let document = self.get(id).await?;
        let mut index = self.load_index().await?;
        index.retain(|entry| entry != id);
        set_json(self.store.as_ref(), keys::DOCUMENT_INDEX, &index).await?;
        self.store.remove(&keys::document(id)).await?;
        tracing::info!(id, "removed document {}", document.name);
        Ok(document)
    }

    pub async fn used_bytes(&self) -> Result<u64, DocumentError> {
        Ok(self.list().await?.iter().map(Document::size_bytes).sum())
    }

    /// Sharing is on until the user turns it off.
    pub async fn sharing_enabled(&self) -> Result<bool, DocumentError> {
        Ok(get_json::<bool>(self.store.as_ref(), keys::KNOWLEDGE_SHARING)
            .await?
            .unwrap_or(true))
    }

    pub async fn set_sharing_enabled(&self, enabled: bool) -> Result<(), DocumentError> {
        set_json(self.store.as_ref(), keys::KNOWLEDGE_SHARING, &enabled).await?;
        Ok(())
    }

    async fn load_index(&self) -> Result<Vec<String>, StorageError> {
        Ok(get_json::<Vec<String>>(self.store.as_ref(), keys::DOCUMENT_INDEX)
            .await?
            .unwrap_or_default())
    }

    /// Index entries whose body has gone missing are skipped.
    async fn load_all(&self, index: &[String]) -> Result<Vec<Document>, StorageError> {
        let mut documents = Vec::with_capacity(index.len());
        for id in index {
            match get_json::<Document>(self.store.as_ref(), &keys::document(id)).await? {
                Some(document) => documents.push(document),
                None => tracing::warn!(id, "document index entry has no body"),
            }
        }
        Ok(documents)
    }
}

impl DocumentSource for DocumentLibrary {
    fn knowledge_sharing_enabled(&self) -> SourceFuture<'_, bool> {
        Box::pin(self.sharing_enabled())
    }

    fn documents(&self) -> SourceFuture<'_, Vec<Document>> {
        Box::pin(self.list())
    }
}
