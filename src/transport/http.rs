use super::envelope::{HistoryMessage, HttpChatRequest, HttpChatResponse};
use super::turn::{TurnOutcome, TurnRequest};
use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::utils::{build_http_client, sanitize_api_error};
use chrono::Local;
use reqwest::Client;

/// Single-shot request/response fallback used when the socket is down.
pub struct HttpChatClient {
    chat_url: String,
    api_key: Option<String>,
    model: String,
    request_timeout_secs: u64,
    client: Client,
}

impl HttpChatClient {
    pub fn new(
        base_url: &str,
        chat_path: &str,
        api_key: Option<&str>,
        model: &str,
        request_timeout_secs: u64,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/');
        let chat_path = chat_path.trim_start_matches('/');
        Self {
            chat_url: format!("{base_url}/{chat_path}"),
            api_key: api_key.map(str::to_string),
            model: model.to_string(),
            request_timeout_secs,
            client: build_http_client(request_timeout_secs),
        }
    }

    pub fn from_config(config: &TransportConfig, api_key: Option<&str>, model: &str) -> Self {
        Self::new(
            &config.http_base_url,
            &config.chat_path,
            api_key,
            model,
            config.request_timeout_secs,
        )
    }

    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }

    fn apply_auth_header(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("x-api-key", key),
            None => req,
        }
    }

    pub async fn send(&self, request: &TurnRequest) -> Result<TurnOutcome, TransportError> {
        let body = HttpChatRequest {
            messages: build_messages(request),
            model: &self.model,
            user_timezone_offset: timezone_offset_minutes(),
            is_first_message: request.is_first_message,
        };

        let response = self
            .apply_auth_header(self.client.post(&self.chat_url).json(&body))
            .send()
            .await
            .map_err(|error| self.request_error(&error))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                message: sanitize_api_error(&text),
            });
        }

        let reply: HttpChatResponse = response
            .json()
            .await
            .map_err(|error| TransportError::Malformed(error.to_string()))?;

        Ok(TurnOutcome {
            text: reply.message.content,
            actions: None,
            title: reply.title.filter(|title| !title.trim().is_empty()),
        })
    }

    fn request_error(&self, error: &reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout {
                secs: self.request_timeout_secs,
            }
        } else {
            TransportError::Connection(error.to_string())
        }
    }
}

/// Document context first as a system message, then history, then the new
/// user message.
fn build_messages(request: &TurnRequest) -> Vec<HistoryMessage> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    if !request.context.trim().is_empty() {
        messages.push(HistoryMessage::new("system", request.context.clone()));
    }
    messages.extend(request.history.iter().cloned());
    messages.push(HistoryMessage::new("user", request.message.clone()));
    messages
}

/// Minutes to add to local time to reach UTC (positive west of Greenwich).
fn timezone_offset_minutes() -> i32 {
    -(Local::now().offset().local_minus_utc() / 60)
}
