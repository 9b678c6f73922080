use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Author of a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    User,
    Ai,
}

impl MessageType {
    /// Role name used in model-facing history.
    pub fn role(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Ai => "assistant",
        }
    }
}

/// Attachment reference carried alongside a user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileRef>,
}

impl Message {
    pub fn new(
        conversation_id: &str,
        message_type: MessageType,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            message_type,
            timestamp,
            conversation_id: conversation_id.to_string(),
            files: Vec::new(),
        }
    }

    pub fn with_files(mut self, files: Vec<FileRef>) -> Self {
        self.files = files;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Title generated by the server, applied once the reply is visible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_title: Option<String>,
}

impl Conversation {
    pub fn first_user_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .find(|message| message.message_type == MessageType::User)
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Index row kept so listing does not load every message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub message_count: usize,
}

impl From<&Conversation> for ConversationSummary {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id.clone(),
            title: conversation.title.clone(),
            updated_at: conversation.updated_at,
            message_count: conversation.messages.len(),
        }
    }
}
