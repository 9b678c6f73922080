//! Key layout inside the persistent store.

pub const CONVERSATION_INDEX: &str = "conversations:index";
pub const USAGE_RECORD: &str = "usage:record";
pub const CONTEXT_CACHE: &str = "context:cache";
pub const DOCUMENT_INDEX: &str = "documents:index";
pub const KNOWLEDGE_SHARING: &str = "documents:sharing_enabled";

/// Shared by conversation records and their first-message flags.
pub const CONVERSATION_PREFIX: &str = "conversation:";
const DOCUMENT_PREFIX: &str = "document:";

pub fn conversation(id: &str) -> String {
    format!("{CONVERSATION_PREFIX}{id}")
}

pub fn first_message_sent(conversation_id: &str) -> String {
    format!("{CONVERSATION_PREFIX}{conversation_id}:first_message_sent")
}

pub fn document(id: &str) -> String {
    format!("{DOCUMENT_PREFIX}{id}")
}
