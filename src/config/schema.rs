use crate::error::ConfigError;
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// SQLite database backing the persistent store. `~` is expanded.
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    /// Namespace inside the store; one per local user profile.
    #[serde(default = "default_profile")]
    pub profile: String,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub usage: UsageConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub conversations: ConversationsConfig,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_storage_path() -> String {
    "~/.planwise/planwise.db".into()
}

fn default_profile() -> String {
    "default".into()
}

// ── Transport ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Persistent streaming endpoint. Unset means HTTP-only.
    #[serde(default)]
    pub socket_url: Option<String>,
    #[serde(default = "default_http_base_url")]
    pub http_base_url: String,
    #[serde(default = "default_chat_path")]
    pub chat_path: String,
    #[serde(default = "default_turn_timeout_secs")]
    pub turn_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_reconnect_initial_backoff_ms")]
    pub reconnect_initial_backoff_ms: u64,
    #[serde(default = "default_reconnect_max_backoff_ms")]
    pub reconnect_max_backoff_ms: u64,
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
}

fn default_http_base_url() -> String {
    "http://localhost:3000".into()
}

fn default_chat_path() -> String {
    "/chat".into()
}

fn default_turn_timeout_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_reconnect_initial_backoff_ms() -> u64 {
    1_000
}

fn default_reconnect_max_backoff_ms() -> u64 {
    30_000
}

fn default_reconnect_max_attempts() -> u32 {
    5
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            socket_url: None,
            http_base_url: default_http_base_url(),
            chat_path: default_chat_path(),
            turn_timeout_secs: default_turn_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            reconnect_initial_backoff_ms: default_reconnect_initial_backoff_ms(),
            reconnect_max_backoff_ms: default_reconnect_max_backoff_ms(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
        }
    }
}

// ── Usage ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageConfig {
    #[serde(default = "default_min_cost_pct")]
    pub min_cost_pct: f64,
    #[serde(default = "default_max_cost_pct")]
    pub max_cost_pct: f64,
    /// Message characters that add one percentage point to the estimate.
    #[serde(default = "default_chars_per_pct")]
    pub chars_per_pct: u32,
}

fn default_min_cost_pct() -> f64 {
    0.5
}

fn default_max_cost_pct() -> f64 {
    5.0
}

fn default_chars_per_pct() -> u32 {
    400
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            min_cost_pct: default_min_cost_pct(),
            max_cost_pct: default_max_cost_pct(),
            chars_per_pct: default_chars_per_pct(),
        }
    }
}

// ── Document context ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_document_quota_bytes")]
    pub document_quota_bytes: u64,
    /// Upload endpoint that turns binary documents into text.
    #[serde(default)]
    pub processor_url: Option<String>,
}

fn default_ttl_secs() -> u64 {
    600
}

fn default_max_context_chars() -> usize {
    50_000
}

fn default_document_quota_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_context_chars: default_max_context_chars(),
            document_quota_bytes: default_document_quota_bytes(),
            processor_url: None,
        }
    }
}

// ── Conversations ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationsConfig {
    #[serde(default = "default_retention_cap")]
    pub retention_cap: usize,
}

fn default_retention_cap() -> usize {
    50
}

impl Default for ConversationsConfig {
    fn default() -> Self {
        Self {
            retention_cap: default_retention_cap(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());

        Self {
            config_path: home.join(".planwise").join("config.toml"),
            api_key: None,
            model: default_model(),
            storage_path: default_storage_path(),
            profile: default_profile(),
            transport: TransportConfig::default(),
            usage: UsageConfig::default(),
            context: ContextConfig::default(),
            conversations: ConversationsConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let usage = &self.usage;
        if !(usage.min_cost_pct > 0.0 && usage.min_cost_pct <= usage.max_cost_pct) {
            return Err(ConfigError::Validation(format!(
                "usage cost band must satisfy 0 < min_cost_pct <= max_cost_pct (got {} / {})",
                usage.min_cost_pct, usage.max_cost_pct
            )));
        }
        if usage.max_cost_pct > 100.0 {
            return Err(ConfigError::Validation(
                "usage.max_cost_pct cannot exceed 100".into(),
            ));
        }
        if usage.chars_per_pct == 0 {
            return Err(ConfigError::Validation(
                "usage.chars_per_pct must be positive".into(),
            ));
        }
        if self.context.ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "context.ttl_secs must be positive".into(),
            ));
        }
        if self.context.max_context_chars == 0 {
            return Err(ConfigError::Validation(
                "context.max_context_chars must be positive".into(),
            ));
        }
        if self.conversations.retention_cap == 0 {
            return Err(ConfigError::Validation(
                "conversations.retention_cap must be positive".into(),
            ));
        }
        if self.transport.turn_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "transport.turn_timeout_secs must be positive".into(),
            ));
        }
        if let Some(socket_url) = &self.transport.socket_url {
            let parsed = url::Url::parse(socket_url).map_err(|error| {
                ConfigError::Validation(format!("transport.socket_url: {error}"))
            })?;
            if !matches!(parsed.scheme(), "ws" | "wss") {
                return Err(ConfigError::Validation(format!(
                    "transport.socket_url must use ws:// or wss:// (got {})",
                    parsed.scheme()
                )));
            }
        }
        url::Url::parse(&self.transport.http_base_url).map_err(|error| {
            ConfigError::Validation(format!("transport.http_base_url: {error}"))
        })?;
        Ok(())
    }

    /// Storage path with `~` expanded.
    pub fn resolved_storage_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.storage_path).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_has_sane_values() {
        let c = Config::default();
        assert!(c.api_key.is_none());
        assert_eq!(c.transport.turn_timeout_secs, 60);
        assert_eq!(c.context.ttl_secs, 600);
        assert_eq!(c.conversations.retention_cap, 50);
        assert!(c.config_path.to_string_lossy().contains("config.toml"));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn config_toml_roundtrip() {
        let mut config = Config {
            api_key: Some("pw-test-key".into()),
            model: "gpt-4o".into(),
            ..Config::default()
        };
        config.transport.socket_url = Some("wss://chat.example.com/ws".into());
        config.context.max_context_chars = 1_234;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.api_key.as_deref(), Some("pw-test-key"));
        assert_eq!(parsed.model, "gpt-4o");
        assert_eq!(
            parsed.transport.socket_url.as_deref(),
            Some("wss://chat.example.com/ws")
        );
        assert_eq!(parsed.context.max_context_chars, 1_234);
    }

    #[test]
    fn minimal_toml_fills_defaults() {
        let parsed: Config = toml::from_str("api_key = \"k\"\n").unwrap();
        assert_eq!(parsed.usage.chars_per_pct, 400);
        assert_eq!(parsed.transport.reconnect_max_attempts, 5);
        assert_eq!(parsed.profile, "default");
    }

    #[test]
    fn validate_rejects_inverted_cost_band() {
        let mut c = Config::default();
        c.usage.min_cost_pct = 6.0;
        c.usage.max_cost_pct = 2.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn validate_rejects_http_socket_url() {
        let mut c = Config::default();
        c.transport.socket_url = Some("https://chat.example.com".into());
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("ws://"));
    }

    #[test]
    fn validate_rejects_zero_retention() {
        let mut c = Config::default();
        c.conversations.retention_cap = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_context_budget() {
        let mut c = Config::default();
        c.context.max_context_chars = 0;
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("max_context_chars"));
    }

    #[test]
    fn storage_path_expands_tilde() {
        let c = Config::default();
        let resolved = c.resolved_storage_path();
        assert!(!resolved.to_string_lossy().starts_with('~'));
        assert!(resolved.ends_with("planwise.db"));
    }
}
