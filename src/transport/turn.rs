use super::envelope::HistoryMessage;
use crate::conversation::FileRef;
use crate::directives::Action;
use crate::error::TransportError;
use futures_util::Stream;
use std::pin::Pin;
use strum::Display;

/// Lifecycle of one logical turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TurnPhase {
    Idle,
    Sending,
    Streaming,
    Completed,
    Failed,
}

impl TurnPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Sending)
                | (Self::Sending | Self::Streaming, Self::Streaming)
                | (Self::Sending | Self::Streaming, Self::Completed)
                | (Self::Idle | Self::Sending | Self::Streaming, Self::Failed)
        )
    }

    /// Move to `next` if allowed. Returns whether the move happened.
    pub fn advance(&mut self, next: Self) -> bool {
        if self.can_transition_to(next) {
            *self = next;
            true
        } else {
            tracing::debug!(from = %self, to = %next, "ignored invalid turn transition");
            false
        }
    }
}

/// Everything the transport needs for one turn.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub conversation_id: String,
    pub message: String,
    pub history: Vec<HistoryMessage>,
    /// Document context; empty when none is injected.
    pub context: String,
    pub is_first_message: bool,
    pub files: Vec<FileRef>,
}

/// Final result of a turn.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TurnOutcome {
    pub text: String,
    /// Actions computed by the server, when it supplied any.
    pub actions: Option<Vec<Action>>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// Cumulative text received so far.
    Chunk(String),
    Completed(TurnOutcome),
    Failed(TransportError),
}

impl TurnEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Chunk(_))
    }
}

/// Ordered events of one turn: zero or more chunks, then exactly one
/// terminal event.
pub type TurnStream = Pin<Box<dyn Stream<Item = TurnEvent> + Send>>;
