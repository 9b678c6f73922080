//! Turn delivery: streamed over the persistent socket when it is up, single
//! shot over HTTP otherwise.

pub mod client;
pub mod envelope;
pub mod http;
pub mod socket;
pub mod turn;

pub use client::TransportClient;
pub use envelope::{HistoryMessage, InboundEnvelope, InboundKind, KnowledgeContext, OutboundEnvelope};
pub use http::HttpChatClient;
pub use socket::{ConnectionStatus, ReconnectPolicy, SocketConnection, Subscription};
pub use turn::{TurnEvent, TurnOutcome, TurnPhase, TurnRequest, TurnStream};
