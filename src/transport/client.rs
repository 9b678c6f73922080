use super::envelope::{InboundKind, KnowledgeContext, OutboundEnvelope, SEND_MESSAGE_ACTION};
use super::http::HttpChatClient;
use super::socket::{SocketConnection, Subscription};
use super::turn::{TurnEvent, TurnOutcome, TurnPhase, TurnRequest, TurnStream};
use crate::directives::types::decode_actions;
use crate::error::TransportError;
use async_stream::stream;
use std::sync::Arc;
use std::time::Duration;

/// Dual-mode turn sender: the persistent socket when it is up, the HTTP
/// endpoint otherwise.
#[derive(Clone)]
pub struct TransportClient {
    socket: Option<SocketConnection>,
    http: Arc<HttpChatClient>,
    turn_timeout: Duration,
}

impl TransportClient {
    pub fn new(
        socket: Option<SocketConnection>,
        http: HttpChatClient,
        turn_timeout: Duration,
    ) -> Self {
        Self {
            socket,
            http: Arc::new(http),
            turn_timeout,
        }
    }

    pub fn socket(&self) -> Option<&SocketConnection> {
        self.socket.as_ref()
    }

    /// Start a turn. The returned stream yields cumulative chunks, then
    /// exactly one `Completed` or `Failed`, then ends.
    pub fn send(&self, request: TurnRequest) -> TurnStream {
        let socket = self.socket.clone().filter(SocketConnection::is_connected);
        let http = Arc::clone(&self.http);
        let turn_timeout = self.turn_timeout;

        Box::pin(stream! {
            let mut phase = TurnPhase::Idle;
            phase.advance(TurnPhase::Sending);

            let mut streamed = None;
            if let Some(socket) = socket {
                let response_id = uuid::Uuid::new_v4().to_string();
                let subscription = socket.subscribe(&request.conversation_id);
                match socket.send(&build_envelope(&request, &response_id)) {
                    Ok(()) => streamed = Some((subscription, response_id)),
                    Err(error) => {
                        tracing::warn!("socket send failed, falling back to http: {error}");
                        subscription.unsubscribe();
                    }
                }
            }

            match streamed {
                Some((mut subscription, response_id)) => {
                    let deadline = tokio::time::Instant::now() + turn_timeout;
                    let mut accumulated = String::new();
                    loop {
                        let event = next_socket_event(
                            &mut subscription,
                            &response_id,
                            &mut accumulated,
                            deadline,
                            turn_timeout,
                        )
                        .await;
                        let next_phase = match &event {
                            TurnEvent::Chunk(_) => TurnPhase::Streaming,
                            TurnEvent::Completed(_) => TurnPhase::Completed,
                            TurnEvent::Failed(_) => TurnPhase::Failed,
                        };
                        phase.advance(next_phase);
                        let terminal = event.is_terminal();
                        yield event;
                        if terminal {
                            break;
                        }
                    }
                    subscription.unsubscribe();
                }
                None => {
                    let event = match tokio::time::timeout(turn_timeout, http.send(&request)).await {
                        Ok(Ok(outcome)) => TurnEvent::Completed(outcome),
                        Ok(Err(error)) => TurnEvent::Failed(error),
                        Err(_) => TurnEvent::Failed(TransportError::Timeout {
                            secs: turn_timeout.as_secs(),
                        }),
                    };
                    phase.advance(if matches!(event, TurnEvent::Completed(_)) {
                        TurnPhase::Completed
                    } else {
                        TurnPhase::Failed
                    });
                    yield event;
                }
            }
            tracing::debug!(phase = %phase, "turn finished");
        })
    }
}

fn build_envelope(request: &TurnRequest, response_id: &str) -> OutboundEnvelope {
    OutboundEnvelope {
        action: SEND_MESSAGE_ACTION,
        message: request.message.clone(),
        conversation_id: request.conversation_id.clone(),
        message_history: request.history.clone(),
        response_id: response_id.to_string(),
        is_first_message: request.is_first_message,
        user_knowledge_context: KnowledgeContext {
            enabled: !request.context.is_empty(),
            document_context: request.context.clone(),
            files: request.files.clone(),
        },
    }
}

/// Wait for the next payload that belongs to this turn and turn it into an
/// event. Chunk `content` is a delta; callers get the running total.
async fn next_socket_event(
    subscription: &mut Subscription,
    response_id: &str,
    accumulated: &mut String,
    deadline: tokio::time::Instant,
    turn_timeout: Duration,
) -> TurnEvent {
    loop {
        let delivery = match tokio::time::timeout_at(deadline, subscription.recv()).await {
            Err(_) => {
                return TurnEvent::Failed(TransportError::Timeout {
                    secs: turn_timeout.as_secs(),
                });
            }
            Ok(None) => {
                return TurnEvent::Failed(TransportError::Connection(
                    "subscription closed".into(),
                ));
            }
            Ok(Some(Err(error))) => return TurnEvent::Failed(error),
            Ok(Some(Ok(envelope))) => envelope,
        };

        if delivery
            .response_id
            .as_deref()
            .is_some_and(|id| id != response_id)
        {
            continue;
        }

        match delivery.kind {
            InboundKind::Chunk => {
                let Some(content) = delivery.content.filter(|content| !content.is_empty()) else {
                    continue;
                };
                accumulated.push_str(&content);
                return TurnEvent::Chunk(accumulated.clone());
            }
            InboundKind::Complete => {
                let text = delivery
                    .content
                    .filter(|content| !content.is_empty())
                    .unwrap_or_else(|| accumulated.clone());
                let actions = delivery
                    .actions
                    .map(|raw| decode_actions(&raw))
                    .filter(|actions| !actions.is_empty());
                return TurnEvent::Completed(TurnOutcome {
                    text,
                    actions,
                    title: delivery.title.filter(|title| !title.trim().is_empty()),
                });
            }
            InboundKind::Error => {
                return TurnEvent::Failed(TransportError::Server(
                    delivery
                        .error
                        .unwrap_or_else(|| "server reported an error".into()),
                ));
            }
        }
    }
}
