use super::types::{Conversation, ConversationSummary, FileRef, Message, MessageType};
use crate::error::{ConversationError, StorageError};
use crate::store::{KvStore, get_json, keys, set_json};
use crate::utils::{Clock, SystemClock, truncate_chars};
use std::sync::Arc;
use tokio::sync::Mutex;

pub const DEFAULT_TITLE: &str = "New Conversation";
const DERIVED_TITLE_CHARS: usize = 40;

/// Title used when the server does not generate one: the opening user
/// message, cut to 40 characters.
pub fn derive_title(first_user_text: &str) -> String {
    let title = truncate_chars(first_user_text.trim(), DERIVED_TITLE_CHARS).trim_end();
    if title.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        title.to_string()
    }
}

/// Conversation records persisted in the KV store, capped at
/// `retention_cap` entries with oldest-updated eviction.
pub struct ConversationStore {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    retention_cap: usize,
    write_lock: Mutex<()>,
}

impl ConversationStore {
    pub fn new(store: Arc<dyn KvStore>, retention_cap: usize) -> Self {
        Self::with_clock(store, retention_cap, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn KvStore>, retention_cap: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            retention_cap: retention_cap.max(1),
            write_lock: Mutex::new(()),
        }
    }

    pub async fn create(&self, title: Option<&str>) -> Result<Conversation, ConversationError> {
        let _guard = self.write_lock.lock().await;

        let now = self.clock.now();
        let conversation = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            title: title
                .map(str::trim)
                .filter(|title| !title.is_empty())
                .unwrap_or(DEFAULT_TITLE)
                .to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            pending_title: None,
        };
        self.write_record(&conversation).await?;

        let mut index = self.load_index().await?;
        index.push(ConversationSummary::from(&conversation));
        self.evict_over_cap(&mut index, &conversation.id).await?;
        self.save_index(&index).await?;

        tracing::debug!(id = %conversation.id, "created conversation");
        Ok(conversation)
    }

    pub async fn get(&self, id: &str) -> Result<Conversation, ConversationError> {
        get_json::<Conversation>(self.store.as_ref(), &keys::conversation(id))
            .await?
            .ok_or_else(|| ConversationError::NotFound(id.to_string()))
    }

    /// Most recently updated first.
    pub async fn list(&self) -> Result<Vec<ConversationSummary>, ConversationError> {
        let mut index = self.load_index().await?;
        index.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(index)
    }

    pub async fn append_message(
        &self,
        conversation_id: &str,
        message_type: MessageType,
        text: &str,
        files: Vec<FileRef>,
    ) -> Result<Message, ConversationError> {
        let _guard = self.write_lock.lock().await;

        let mut conversation = self.get(conversation_id).await?;
        let now = self.clock.now();
        let message = Message::new(conversation_id, message_type, text, now).with_files(files);
        conversation.messages.push(message.clone());
        conversation.updated_at = now;
        self.persist(&conversation).await?;
        Ok(message)
    }

    pub async fn set_title(&self, id: &str, title: &str) -> Result<(), ConversationError> {
        let _guard = self.write_lock.lock().await;

        let mut conversation = self.get(id).await?;
        conversation.title = title.trim().to_string();
        conversation.pending_title = None;
        self.persist(&conversation).await
    }

    pub async fn set_pending_title(&self, id: &str, title: &str) -> Result<(), ConversationError> {
        let _guard = self.write_lock.lock().await;

        let mut conversation = self.get(id).await?;
        conversation.pending_title = Some(title.trim().to_string());
        self.write_record(&conversation).await?;
        Ok(())
    }

    /// Promote a pending title, returning it when one was waiting.
    pub async fn apply_pending_title(&self, id: &str) -> Result<Option<String>, ConversationError> {
        let _guard = self.write_lock.lock().await;

        let mut conversation = self.get(id).await?;
        let Some(title) = conversation.pending_title.take() else {
            return Ok(None);
        };
        conversation.title = title.clone();
        self.persist(&conversation).await?;
        Ok(Some(title))
    }

    pub async fn delete(&self, id: &str) -> Result<(), ConversationError> {
        let _guard = self.write_lock.lock().await;

        let mut index = self.load_index().await?;
        let before = index.len();
        index.retain(|summary| summary.id != id);
        let removed = self.store.remove(&keys::conversation(id)).await?;
        if !removed && index.len() == before {
            return Err(ConversationError::NotFound(id.to_string()));
        }
        self.store.remove(&keys::first_message_sent(id)).await?;
        self.save_index(&index).await?;
        tracing::info!(id, "deleted conversation");
        Ok(())
    }

    /// Remove every conversation, including records and flags the index
    /// lost track of. Returns how many indexed conversations were dropped.
    pub async fn clear(&self) -> Result<usize, ConversationError> {
        let _guard = self.write_lock.lock().await;

        let index = self.load_index().await?;
        for key in self.store.keys_with_prefix(keys::CONVERSATION_PREFIX).await? {
            self.store.remove(&key).await?;
        }
        self.store.remove(keys::CONVERSATION_INDEX).await?;
        Ok(index.len())
    }

    pub async fn mark_first_message_sent(&self, id: &str) -> Result<(), ConversationError> {
        set_json(self.store.as_ref(), &keys::first_message_sent(id), &true).await?;
        Ok(())
    }

    pub async fn is_first_message_sent(&self, id: &str) -> Result<bool, ConversationError> {
        Ok(get_json::<bool>(self.store.as_ref(), &keys::first_message_sent(id))
            .await?
            .unwrap_or(false))
    }

    async fn persist(&self, conversation: &Conversation) -> Result<(), ConversationError> {
        self.write_record(conversation).await?;

        let mut index = self.load_index().await?;
        let summary = ConversationSummary::from(conversation);
        match index.iter_mut().find(|entry| entry.id == conversation.id) {
            Some(entry) => *entry = summary,
            None => index.push(summary),
        }
        self.save_index(&index).await?;
        Ok(())
    }

    /// Drop the oldest-updated conversations until the cap holds. The
    /// conversation just inserted is never a candidate.
    async fn evict_over_cap(
        &self,
        index: &mut Vec<ConversationSummary>,
        inserted_id: &str,
    ) -> Result<(), StorageError> {
        while index.len() > self.retention_cap {
            let Some(position) = index
                .iter()
                .enumerate()
                .filter(|(_, summary)| summary.id != inserted_id)
                .min_by_key(|(_, summary)| summary.updated_at)
                .map(|(position, _)| position)
            else {
                break;
            };
            let evicted = index.remove(position);
            self.remove_record(&evicted.id).await?;
            tracing::info!(id = %evicted.id, "evicted conversation over retention cap");
        }
        Ok(())
    }

    async fn write_record(&self, conversation: &Conversation) -> Result<(), StorageError> {
        set_json(
            self.store.as_ref(),
            &keys::conversation(&conversation.id),
            conversation,
        )
        .await
    }

    async fn remove_record(&self, id: &str) -> Result<(), StorageError> {
        self.store.remove(&keys::conversation(id)).await?;
        self.store.remove(&keys::first_message_sent(id)).await?;
        Ok(())
    }

    async fn load_index(&self) -> Result<Vec<ConversationSummary>, StorageError> {
        Ok(
            get_json::<Vec<ConversationSummary>>(self.store.as_ref(), keys::CONVERSATION_INDEX)
                .await?
                .unwrap_or_default(),
        )
    }

    async fn save_index(&self, index: &[ConversationSummary]) -> Result<(), StorageError> {
        set_json(self.store.as_ref(), keys::CONVERSATION_INDEX, index).await
    }
}
