//! Top-level turn pipeline.

pub mod engine;
pub mod observer;
pub mod reply;

pub use engine::{Orchestrator, TurnOptions, format_history};
pub use observer::{NoopObserver, ObservedEvent, RecordingObserver, TurnObserver};
pub use reply::{
    APOLOGY_MESSAGE, AssistantReply, CAPACITY_EXCEEDED_MESSAGE, ConversationTurn,
    LIMIT_REACHED_MESSAGE,
};
