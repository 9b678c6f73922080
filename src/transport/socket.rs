//! Process-wide persistent streaming connection.
//!
//! One physical websocket fans inbound envelopes out to per-conversation
//! subscribers. Subscriptions are RAII guards: dropping one (or calling
//! [`Subscription::unsubscribe`]) removes its handlers, so timed-out or failed
//! turns never leak registrations.

use super::envelope::{InboundEnvelope, InboundKind, OutboundEnvelope};
use crate::config::TransportConfig;
use crate::error::TransportError;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use strum::{Display, IntoEnumIterator};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// What a subscriber receives: a decoded envelope, or the reason the
/// connection can no longer serve it.
pub type SocketDelivery = Result<InboundEnvelope, TransportError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Reconnect attempts exhausted.
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_attempts: u32,
}

impl From<&TransportConfig> for ReconnectPolicy {
    fn from(config: &TransportConfig) -> Self {
        let initial_backoff = Duration::from_millis(config.reconnect_initial_backoff_ms.max(1));
        Self {
            initial_backoff,
            max_backoff: Duration::from_millis(config.reconnect_max_backoff_ms).max(initial_backoff),
            max_attempts: config.reconnect_max_attempts,
        }
    }
}

// ── Handler registry ──────────────────────────────────────────────

type HandlerKey = (String, InboundKind);

#[derive(Default)]
struct Registry {
    handlers: HashMap<HandlerKey, HashMap<u64, mpsc::UnboundedSender<SocketDelivery>>>,
}

impl Registry {
    fn register(&mut self, conversation_id: &str, id: u64, tx: &mpsc::UnboundedSender<SocketDelivery>) {
        for kind in InboundKind::iter() {
            self.handlers
                .entry((conversation_id.to_string(), kind))
                .or_default()
                .insert(id, tx.clone());
        }
    }

    fn unregister(&mut self, conversation_id: &str, id: u64) {
        for kind in InboundKind::iter() {
            let key = (conversation_id.to_string(), kind);
            if let Some(slot) = self.handlers.get_mut(&key) {
                slot.remove(&id);
                if slot.is_empty() {
                    self.handlers.remove(&key);
                }
            }
        }
    }

    fn dispatch(&self, envelope: &InboundEnvelope) -> usize {
        let key = (envelope.conversation_id.clone(), envelope.kind);
        let Some(slot) = self.handlers.get(&key) else {
            return 0;
        };
        slot.values()
            .filter(|tx| tx.send(Ok(envelope.clone())).is_ok())
            .count()
    }

    fn dispatch_error(&self, conversation_id: &str, error: &TransportError) {
        let key = (conversation_id.to_string(), InboundKind::Error);
        if let Some(slot) = self.handlers.get(&key) {
            for tx in slot.values() {
                let _ = tx.send(Err(error.clone()));
            }
        }
    }

    /// Tell every live subscriber the connection is gone.
    fn fail_all(&self, error: &TransportError) {
        let mut notified = std::collections::HashSet::new();
        for ((_, kind), slot) in &self.handlers {
            if *kind != InboundKind::Error {
                continue;
            }
            for (id, tx) in slot {
                if notified.insert(*id) {
                    let _ = tx.send(Err(error.clone()));
                }
            }
        }
    }

    fn handler_count(&self) -> usize {
        self.handlers.values().map(HashMap::len).sum()
    }
}

/// Per-conversation receiver; deregisters when dropped.
pub struct Subscription {
    conversation_id: String,
    id: u64,
    rx: mpsc::UnboundedReceiver<SocketDelivery>,
    registry: Arc<Mutex<Registry>>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<SocketDelivery> {
        self.rx.recv().await
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unregister(&self.conversation_id, self.id);
    }
}

// ── Connection ────────────────────────────────────────────────────

struct Shared {
    url: String,
    policy: ReconnectPolicy,
    status: watch::Sender<ConnectionStatus>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    registry: Arc<Mutex<Registry>>,
    session: Mutex<Option<Session>>,
    next_handler_id: AtomicU64,
    next_session_id: AtomicU64,
}

struct Session {
    id: u64,
    token: CancellationToken,
}

impl Shared {
    fn set_status(&self, status: ConnectionStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            tracing::info!(from = %current, to = %status, "socket status changed");
            *current = status;
            true
        });
    }

    fn set_outbound(&self, sender: Option<mpsc::UnboundedSender<Message>>) {
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = sender;
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle_text(&self, raw: &str) {
        let value: serde_json::Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!("dropping non-JSON socket payload: {error}");
                return;
            }
        };
        let Some(conversation_id) = value
            .get("conversationId")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
        else {
            tracing::debug!("dropping socket payload without conversationId");
            return;
        };

        match serde_json::from_value::<InboundEnvelope>(value) {
            Ok(envelope) => {
                let delivered = self.registry().dispatch(&envelope);
                if delivered == 0 {
                    tracing::debug!(
                        conversation_id = %envelope.conversation_id,
                        kind = %envelope.kind,
                        "no subscriber for socket payload"
                    );
                }
            }
            Err(error) => {
                let error = TransportError::Malformed(error.to_string());
                self.registry().dispatch_error(&conversation_id, &error);
            }
        }
    }

    fn open_outbound(&self) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.set_outbound(Some(tx));
        rx
    }

    /// Drive one established socket until it closes or the session is
    /// cancelled. Returns `true` when cancelled.
    async fn run_session(
        &self,
        ws: WsStream,
        mut rx: mpsc::UnboundedReceiver<Message>,
        token: &CancellationToken,
    ) -> bool {
        let (mut write, mut read) = ws.split();

        let cancelled = loop {
            tokio::select! {
                () = token.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    break true;
                }
                Some(outbound) = rx.recv() => {
                    if let Err(error) = write.send(outbound).await {
                        tracing::warn!("socket write failed: {error}");
                        break false;
                    }
                }
                message = read.next() => {
                    let Some(message) = message else {
                        tracing::warn!("socket closed by server");
                        break false;
                    };
                    match message {
                        Ok(Message::Close(_)) => {
                            tracing::info!("socket close frame received");
                            break false;
                        }
                        Ok(message) => {
                            if let Some(raw) = websocket_message_to_text(message) {
                                self.handle_text(&raw);
                            }
                        }
                        Err(error) => {
                            tracing::warn!("socket read failed: {error}");
                            break false;
                        }
                    }
                }
            }
        };

        self.set_outbound(None);
        cancelled
    }

    /// Keep the connection alive, reconnecting with exponential backoff until
    /// the attempt cap is hit.
    async fn supervise(
        self: Arc<Self>,
        mut ws: WsStream,
        mut rx: mpsc::UnboundedReceiver<Message>,
        token: CancellationToken,
    ) {
        loop {
            if self.run_session(ws, rx, &token).await {
                self.set_status(ConnectionStatus::Disconnected);
                return;
            }
            self.registry()
                .fail_all(&TransportError::Connection("connection lost".into()));

            let Some(reconnected) = self.reconnect(&token).await else {
                return;
            };
            ws = reconnected;
            rx = self.open_outbound();
            self.set_status(ConnectionStatus::Connected);
        }
    }

    async fn reconnect(&self, token: &CancellationToken) -> Option<WsStream> {
        let mut backoff = self.policy.initial_backoff;
        for attempt in 1..=self.policy.max_attempts {
            self.set_status(ConnectionStatus::Connecting);
            tokio::select! {
                () = token.cancelled() => {
                    self.set_status(ConnectionStatus::Disconnected);
                    return None;
                }
                () = tokio::time::sleep(backoff) => {}
            }
            // Double after sleeping so the first retry waits the initial backoff.
            backoff = backoff.saturating_mul(2).min(self.policy.max_backoff);

            match open_socket(&self.url).await {
                Ok(ws) => {
                    tracing::info!(attempt, "socket reconnected");
                    return Some(ws);
                }
                Err(error) => {
                    tracing::warn!(attempt, "socket reconnect failed: {error}");
                }
            }
        }

        tracing::warn!(
            attempts = self.policy.max_attempts,
            "socket unavailable; giving up on reconnects"
        );
        self.set_status(ConnectionStatus::Unavailable);
        self.registry().fail_all(&TransportError::Unavailable {
            attempts: self.policy.max_attempts,
        });
        None
    }
}

/// Cloneable handle to the shared connection.
#[derive(Clone)]
pub struct SocketConnection {
    shared: Arc<Shared>,
}

impl SocketConnection {
    pub fn new(url: &str, policy: ReconnectPolicy) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            shared: Arc::new(Shared {
                url: url.to_string(),
                policy,
                status,
                outbound: Mutex::new(None),
                registry: Arc::new(Mutex::new(Registry::default())),
                session: Mutex::new(None),
                next_handler_id: AtomicU64::new(1),
                next_session_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn from_config(config: &TransportConfig) -> Option<Self> {
        config
            .socket_url
            .as_deref()
            .map(|url| Self::new(url, ReconnectPolicy::from(config)))
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    /// Open the socket. A no-op when a session is already running.
    pub async fn connect(&self) -> Result<(), TransportError> {
        if self
            .shared
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
        {
            return Ok(());
        }

        self.shared.set_status(ConnectionStatus::Connecting);
        let ws = match open_socket(&self.shared.url).await {
            Ok(ws) => ws,
            Err(error) => {
                self.shared.set_status(ConnectionStatus::Disconnected);
                return Err(error);
            }
        };

        let token = CancellationToken::new();
        let session_id = self.shared.next_session_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut session = self
                .shared
                .session
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if session.is_some() {
                // Lost a connect race; keep the existing session.
                return Ok(());
            }
            *session = Some(Session {
                id: session_id,
                token: token.clone(),
            });
        }

        let rx = self.shared.open_outbound();
        self.shared.set_status(ConnectionStatus::Connected);
        tracing::info!(url = %self.shared.url, "socket connected");

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            Arc::clone(&shared).supervise(ws, rx, token).await;
            let mut session = shared.session.lock().unwrap_or_else(PoisonError::into_inner);
            if session.as_ref().is_some_and(|current| current.id == session_id) {
                *session = None;
            }
        });
        Ok(())
    }

    pub async fn disconnect(&self) {
        let session = self
            .shared
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(session) = session {
            session.token.cancel();
            let mut status = self.status();
            let _ = tokio::time::timeout(
                Duration::from_secs(5),
                status.wait_for(|current| *current == ConnectionStatus::Disconnected),
            )
            .await;
        }
        self.shared.set_outbound(None);
        self.shared.set_status(ConnectionStatus::Disconnected);
    }

    pub fn is_connected(&self) -> bool {
        *self.shared.status.borrow() == ConnectionStatus::Connected
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// Register for every inbound kind addressed to `conversation_id`.
    pub fn subscribe(&self, conversation_id: &str) -> Subscription {
        let id = self.shared.next_handler_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.registry().register(conversation_id, id, &tx);
        Subscription {
            conversation_id: conversation_id.to_string(),
            id,
            rx,
            registry: Arc::clone(&self.shared.registry),
        }
    }

    pub fn send(&self, envelope: &OutboundEnvelope) -> Result<(), TransportError> {
        let payload =
            serde_json::to_string(envelope).map_err(|error| TransportError::Send(error.to_string()))?;
        let outbound = self
            .shared
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(outbound) = outbound else {
            return Err(TransportError::Send("socket not connected".into()));
        };
        outbound
            .send(Message::Text(payload.into()))
            .map_err(|_| TransportError::Send("socket writer closed".into()))
    }

    /// Live handler registrations; zero once every turn has finished.
    pub fn active_handlers(&self) -> usize {
        self.shared.registry().handler_count()
    }
}

async fn open_socket(url: &str) -> Result<WsStream, TransportError> {
    match tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(url)).await {
        Ok(Ok((ws, _))) => Ok(ws),
        Ok(Err(error)) => Err(TransportError::Connection(error.to_string())),
        Err(_) => Err(TransportError::Connection(format!(
            "handshake timed out after {}s",
            CONNECT_TIMEOUT.as_secs()
        ))),
    }
}

fn websocket_message_to_text(message: Message) -> Option<String> {
    match message {
        Message::Text(text) => Some(text.to_string()),
        Message::Binary(bytes) => String::from_utf8(bytes.to_vec()).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::envelope::{KnowledgeContext, SEND_MESSAGE_ACTION};
    use tokio::net::TcpListener;

    fn policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(40),
            max_attempts,
        }
    }

    fn envelope(conversation_id: &str) -> OutboundEnvelope {
        OutboundEnvelope {
            action: SEND_MESSAGE_ACTION,
            message: "ping".into(),
            conversation_id: conversation_id.into(),
            message_history: Vec::new(),
            response_id: "r1".into(),
            is_first_message: false,
            user_knowledge_context: KnowledgeContext {
                enabled: false,
                document_context: String::new(),
                files: Vec::new(),
            },
        }
    }

    /// Echo server: answers every `sendMessage` with a chunk and a complete
    /// for the same conversation.
    async fn spawn_echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                    while let Some(Ok(message)) = ws.next().await {
                        let Message::Text(text) = message else { continue };
                        let request: serde_json::Value = serde_json::from_str(&text).unwrap();
                        let id = request["conversationId"].as_str().unwrap().to_string();
                        for reply in [
                            serde_json::json!({"type": "chunk", "conversationId": id, "content": "po"}),
                            serde_json::json!({"type": "complete", "conversationId": id, "content": "pong"}),
                        ] {
                            ws.send(Message::Text(reply.to_string().into())).await.unwrap();
                        }
                    }
                });
            }
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn subscriber_receives_only_its_conversation() {
        let url = spawn_echo_server().await;
        let socket = SocketConnection::new(&url, policy(3));
        socket.connect().await.unwrap();
        assert!(socket.is_connected());

        let mut mine = socket.subscribe("c1");
        let mut other = socket.subscribe("c2");
        socket.send(&envelope("c1")).unwrap();

        let first = mine.recv().await.unwrap().unwrap();
        assert_eq!(first.kind, InboundKind::Chunk);
        let second = mine.recv().await.unwrap().unwrap();
        assert_eq!(second.kind, InboundKind::Complete);
        assert_eq!(second.content.as_deref(), Some("pong"));

        assert!(
            tokio::time::timeout(Duration::from_millis(100), other.recv())
                .await
                .is_err()
        );
        socket.disconnect().await;
    }

    #[test]
    fn dropping_subscription_deregisters_handlers() {
        let socket = SocketConnection::new("ws://127.0.0.1:9", policy(1));
        let first = socket.subscribe("c1");
        let second = socket.subscribe("c1");
        assert_eq!(socket.active_handlers(), 2 * InboundKind::iter().count());

        drop(first);
        assert_eq!(socket.active_handlers(), InboundKind::iter().count());
        second.unsubscribe();
        assert_eq!(socket.active_handlers(), 0);
    }

    #[test]
    fn send_without_connection_fails() {
        let socket = SocketConnection::new("ws://127.0.0.1:9", policy(1));
        assert!(matches!(
            socket.send(&envelope("c1")),
            Err(TransportError::Send(_))
        ));
        assert!(!socket.is_connected());
    }

    #[tokio::test]
    async fn connect_failure_leaves_socket_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let socket = SocketConnection::new(&format!("ws://{addr}"), policy(1));
        assert!(matches!(
            socket.connect().await,
            Err(TransportError::Connection(_))
        ));
        assert_eq!(*socket.status().borrow(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn exhausted_reconnects_report_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept one connection, then close it and stop listening.
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(listener);
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.close(None).await.unwrap();
        });

        let socket = SocketConnection::new(&format!("ws://{addr}"), policy(2));
        let mut pending = socket.subscribe("c1");
        socket.connect().await.unwrap();

        let lost = pending.recv().await.unwrap();
        assert!(matches!(lost, Err(TransportError::Connection(_))));

        let mut status = socket.status();
        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|current| *current == ConnectionStatus::Unavailable),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(!socket.is_connected());
    }

    #[tokio::test]
    async fn malformed_payload_is_routed_as_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _ = ws.next().await;
            let bad = serde_json::json!({"type": "mystery", "conversationId": "c1"});
            ws.send(Message::Text(bad.to_string().into())).await.unwrap();
            let _ = ws.next().await;
        });

        let socket = SocketConnection::new(&format!("ws://{addr}"), policy(1));
        socket.connect().await.unwrap();
        let mut subscription = socket.subscribe("c1");
        socket.send(&envelope("c1")).unwrap();

        let delivery = subscription.recv().await.unwrap();
        assert!(matches!(delivery, Err(TransportError::Malformed(_))));
        socket.disconnect().await;
    }
}
