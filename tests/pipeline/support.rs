#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use planwise::Config;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

/// Config pointing at a throwaway SQLite file and the given HTTP endpoint.
pub fn config_in(dir: &TempDir, http_base_url: &str) -> Config {
    let mut config = Config::default();
    config.storage_path = dir.path().join("planwise.db").display().to_string();
    config.transport.http_base_url = http_base_url.to_string();
    config.transport.request_timeout_secs = 5;
    config.transport.turn_timeout_secs = 5;
    config.transport.reconnect_initial_backoff_ms = 10;
    config.transport.reconnect_max_backoff_ms = 20;
    config.transport.reconnect_max_attempts = 1;
    config
}

/// Every text frame a scripted socket server received, decoded as JSON.
pub type Received = Arc<Mutex<Vec<serde_json::Value>>>;

/// Websocket server answering each request with `replies`, substituting
/// `{cid}` and `{rid}` from the request.
pub async fn scripted_socket(replies: Vec<serde_json::Value>) -> (String, Received) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let received: Received = Arc::default();
    let seen = Arc::clone(&received);
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(message)) = ws.next().await {
            let Message::Text(text) = message else { continue };
            let request: serde_json::Value = serde_json::from_str(&text).unwrap();
            let cid = request["conversationId"].as_str().unwrap().to_string();
            let rid = request["responseId"].as_str().unwrap().to_string();
            seen.lock().unwrap().push(request);
            for reply in &replies {
                let reply = reply
                    .to_string()
                    .replace("{cid}", &cid)
                    .replace("{rid}", &rid);
                ws.send(Message::Text(reply.into())).await.unwrap();
            }
        }
    });
    (format!("ws://{addr}"), received)
}
