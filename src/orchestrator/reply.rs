use crate::directives::Action;

pub const LIMIT_REACHED_MESSAGE: &str = "You've reached your monthly AI usage limit. \
Your allowance resets at the start of next month.";

pub const CAPACITY_EXCEEDED_MESSAGE: &str = "This message would exceed your remaining AI \
usage for this month. Try a shorter message, or wait for the monthly reset.";

pub const APOLOGY_MESSAGE: &str =
    "Sorry, I couldn't complete that response. Please try again in a moment.";

/// What the user sees for a turn. Failed turns still produce displayable
/// text and set `is_error`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssistantReply {
    pub text: String,
    pub actions: Option<Vec<Action>>,
    pub title: Option<String>,
    pub is_error: bool,
}

impl AssistantReply {
    pub fn failure(text: &str) -> Self {
        Self {
            text: text.to_string(),
            is_error: true,
            ..Self::default()
        }
    }
}

/// Result of [`super::Orchestrator::send_in_conversation`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub conversation_id: String,
    pub reply: AssistantReply,
    /// Conversation title after the turn, when it changed.
    pub title: Option<String>,
}
