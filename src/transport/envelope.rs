//! Wire shapes for the streaming socket and the HTTP fallback.

use crate::conversation::FileRef;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter};

pub const SEND_MESSAGE_ACTION: &str = "sendMessage";

/// One role-tagged history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

impl HistoryMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeContext {
    pub enabled: bool,
    pub document_context: String,
    pub files: Vec<FileRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEnvelope {
    pub action: &'static str,
    pub message: String,
    pub conversation_id: String,
    pub message_history: Vec<HistoryMessage>,
    pub response_id: String,
    pub is_first_message: bool,
    pub user_knowledge_context: KnowledgeContext,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InboundKind {
    Chunk,
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEnvelope {
    #[serde(rename = "type")]
    pub kind: InboundKind,
    pub conversation_id: String,
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub actions: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

// ── HTTP fallback ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HttpChatRequest<'a> {
    pub messages: Vec<HistoryMessage>,
    pub model: &'a str,
    pub user_timezone_offset: i32,
    pub is_first_message: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HttpChatMessage {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HttpChatResponse {
    pub message: HttpChatMessage,
    #[serde(default)]
    pub title: Option<String>,
}
