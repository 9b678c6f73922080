//! Conversation records and their message history.

pub mod store;
pub mod types;

pub use store::{ConversationStore, DEFAULT_TITLE, derive_title};
pub use types::{Conversation, ConversationSummary, FileRef, Message, MessageType};
