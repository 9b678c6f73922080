use super::reply::AssistantReply;
use crate::error::PlanwiseError;
use std::sync::Mutex;

/// Streaming callbacks for one turn. Chunks carry cumulative text; exactly
/// one of `on_complete` or `on_error` fires per turn.
pub trait TurnObserver: Send + Sync {
    fn on_chunk(&self, _text: &str) {}

    fn on_complete(&self, _reply: &AssistantReply) {}

    fn on_error(&self, _error: &PlanwiseError) {}
}

/// Observer that ignores every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TurnObserver for NoopObserver {}

/// One recorded callback.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservedEvent {
    Chunk(String),
    Complete(AssistantReply),
    Error(String),
}

/// Observer that keeps every callback in order, for inspection afterwards.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn push(&self, event: ObservedEvent) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event);
    }
}

impl TurnObserver for RecordingObserver {
    fn on_chunk(&self, text: &str) {
        self.push(ObservedEvent::Chunk(text.to_string()));
    }

    fn on_complete(&self, reply: &AssistantReply) {
        self.push(ObservedEvent::Complete(reply.clone()));
    }

    fn on_error(&self, error: &PlanwiseError) {
        self.push(ObservedEvent::Error(error.to_string()));
    }
}
