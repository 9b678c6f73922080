use super::observer::TurnObserver;
use super::reply::{
    APOLOGY_MESSAGE, AssistantReply, CAPACITY_EXCEEDED_MESSAGE, ConversationTurn,
    LIMIT_REACHED_MESSAGE,
};
use crate::context::DocumentContextCache;
use crate::conversation::{
    ConversationStore, DEFAULT_TITLE, FileRef, Message, MessageType, derive_title,
};
use crate::directives::{extract_actions, remove_directives};
use crate::error::{PlanwiseError, UsageError};
use crate::transport::{HistoryMessage, TransportClient, TurnEvent, TurnRequest};
use crate::usage::UsageMeter;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio_util::task::TaskTracker;

/// Per-turn inputs besides the message and history.
#[derive(Debug, Clone, Default)]
pub struct TurnOptions {
    pub conversation_id: String,
    pub is_first_message: bool,
    /// Pre-fetched document context. When `None`, context is resolved from
    /// the cache on the conversation's first turn only.
    pub context: Option<String>,
    pub files: Vec<FileRef>,
}

/// Composes usage gating, document context, transport and directive
/// extraction into one request/response cycle.
pub struct Orchestrator {
    usage: Arc<UsageMeter>,
    context: Arc<DocumentContextCache>,
    conversations: Arc<ConversationStore>,
    transport: TransportClient,
    background: TaskTracker,
}

impl Orchestrator {
    pub fn new(
        usage: Arc<UsageMeter>,
        context: Arc<DocumentContextCache>,
        conversations: Arc<ConversationStore>,
        transport: TransportClient,
    ) -> Self {
        Self {
            usage,
            context,
            conversations,
            transport,
            background: TaskTracker::new(),
        }
    }

    pub fn conversations(&self) -> &Arc<ConversationStore> {
        &self.conversations
    }

    /// Run one turn. Always resolves to displayable text; failures are
    /// reported through `observer.on_error` and replaced by a fixed message.
    pub async fn generate_response(
        &self,
        message: &str,
        history: &[Message],
        options: TurnOptions,
        observer: &dyn TurnObserver,
    ) -> AssistantReply {
        if self.usage.has_reached_limit().await {
            observer.on_error(&PlanwiseError::Usage(UsageError::LimitReached));
            return AssistantReply::failure(LIMIT_REACHED_MESSAGE);
        }

        let cost = self.usage.estimate_cost(message);
        if !self.usage.has_enough_capacity(cost).await {
            let remaining_pct = self.usage.status().await.remaining_percentage;
            observer.on_error(&PlanwiseError::Usage(UsageError::CapacityExceeded {
                required_pct: cost,
                remaining_pct,
            }));
            return AssistantReply::failure(CAPACITY_EXCEEDED_MESSAGE);
        }

        let context = match options.context {
            Some(context) => context,
            None if options.is_first_message => self.context.get_context(false).await,
            None => String::new(),
        };

        let request = TurnRequest {
            conversation_id: options.conversation_id,
            message: message.to_string(),
            history: format_history(history),
            context,
            is_first_message: options.is_first_message,
            files: options.files,
        };

        let mut events = self.transport.send(request);
        let mut outcome = None;
        while let Some(event) = events.next().await {
            match event {
                TurnEvent::Chunk(text) => observer.on_chunk(&text),
                TurnEvent::Completed(done) => {
                    outcome = Some(Ok(done));
                    break;
                }
                TurnEvent::Failed(error) => {
                    outcome = Some(Err(PlanwiseError::Transport(error)));
                    break;
                }
            }
        }

        let outcome = match outcome {
            Some(Ok(outcome)) => outcome,
            Some(Err(error)) => return fail_turn(observer, &error),
            None => {
                let error = PlanwiseError::Other(anyhow::anyhow!("turn ended without a result"));
                return fail_turn(observer, &error);
            }
        };

        let (text, actions) = match outcome.actions {
            Some(actions) => (outcome.text, Some(actions)),
            None => match extract_actions(&outcome.text) {
                Some(actions) => (remove_directives(&outcome.text), Some(actions)),
                None => (outcome.text, None),
            },
        };

        let usage = Arc::clone(&self.usage);
        self.background.spawn(async move {
            usage.record_usage(cost).await;
        });

        let reply = AssistantReply {
            text,
            actions,
            title: outcome.title,
            is_error: false,
        };
        observer.on_complete(&reply);
        reply
    }

    /// Run a turn inside a stored conversation: persists the user message
    /// and the reply, tracks the first-message flag and applies a title.
    pub async fn send_in_conversation(
        &self,
        conversation_id: &str,
        text: &str,
        files: Vec<FileRef>,
        observer: &dyn TurnObserver,
    ) -> Result<ConversationTurn, PlanwiseError> {
        let conversation = self.conversations.get(conversation_id).await?;
        let is_first_message = match self.conversations.is_first_message_sent(conversation_id).await {
            Ok(sent) => !sent,
            Err(error) => {
                tracing::warn!("first-message flag unreadable, assuming follow-up: {error}");
                false
            }
        };

        self.conversations
            .append_message(conversation_id, MessageType::User, text, files.clone())
            .await?;

        let options = TurnOptions {
            conversation_id: conversation_id.to_string(),
            is_first_message,
            context: None,
            files,
        };
        let reply = self
            .generate_response(text, &conversation.messages, options, observer)
            .await;

        self.conversations
            .append_message(conversation_id, MessageType::Ai, &reply.text, Vec::new())
            .await?;
        if is_first_message
            && !reply.is_error
            && let Err(error) = self.conversations.mark_first_message_sent(conversation_id).await
        {
            tracing::warn!(conversation_id, "failed to record first-message flag: {error}");
        }

        let title = if let Some(server_title) = reply.title.as_deref() {
            self.conversations
                .set_pending_title(conversation_id, server_title)
                .await?;
            self.conversations.apply_pending_title(conversation_id).await?
        } else if conversation.title == DEFAULT_TITLE && !reply.is_error {
            let first_user_text = conversation
                .first_user_message()
                .map_or(text, |message| message.text.as_str());
            let derived = derive_title(first_user_text);
            self.conversations.set_title(conversation_id, &derived).await?;
            Some(derived)
        } else {
            None
        };

        Ok(ConversationTurn {
            conversation_id: conversation_id.to_string(),
            reply,
            title,
        })
    }

    /// Wait for spawned usage writes. Call before shutting the runtime down.
    pub async fn flush_background(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }
}

fn fail_turn(observer: &dyn TurnObserver, error: &PlanwiseError) -> AssistantReply {
    tracing::error!("turn failed: {error}");
    observer.on_error(error);
    AssistantReply::failure(APOLOGY_MESSAGE)
}

/// Role-tagged history, dropping a leading assistant welcome message.
pub fn format_history(history: &[Message]) -> Vec<HistoryMessage> {
    let skip = usize::from(
        history
            .first()
            .is_some_and(|message| message.message_type == MessageType::Ai),
    );
    history
        .iter()
        .skip(skip)
        .map(|message| HistoryMessage::new(message.message_type.role(), message.text.clone()))
        .collect()
}
