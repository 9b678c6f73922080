use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `Planwise`.
///
/// Each subsystem defines its own error enum. Library callers can match on
/// these to decide recovery strategy; the binary uses `anyhow::Result` for
/// ad-hoc context chains.
#[derive(Debug, Error)]
pub enum PlanwiseError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Persistent store ────────────────────────────────────────────────
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    // ── Usage metering ──────────────────────────────────────────────────
    #[error("usage: {0}")]
    Usage(#[from] UsageError),

    // ── Transport ───────────────────────────────────────────────────────
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    // ── Directives ──────────────────────────────────────────────────────
    #[error("directive: {0}")]
    Directive(#[from] DirectiveError),

    // ── Documents ───────────────────────────────────────────────────────
    #[error("document: {0}")]
    Document(#[from] DocumentError),

    // ── Conversations ───────────────────────────────────────────────────
    #[error("conversation: {0}")]
    Conversation(#[from] ConversationError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Storage errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("backend: {0}")]
    Backend(String),

    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(error: sqlx::Error) -> Self {
        Self::Backend(error.to_string())
    }
}

// ─── Usage errors ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum UsageError {
    #[error("monthly usage limit reached")]
    LimitReached,

    #[error("request needs {required_pct:.1}% but only {remaining_pct:.1}% remains")]
    CapacityExceeded {
        required_pct: f64,
        remaining_pct: f64,
    },
}

// ─── Transport errors ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("http {status}: {message}")]
    Http { status: u16, message: String },

    #[error("no terminal payload within {secs}s")]
    Timeout { secs: u64 },

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("connection unavailable after {attempts} reconnect attempts")]
    Unavailable { attempts: u32 },
}

// ─── Directive errors ────────────────────────────────────────────────────────

/// Never surfaced to callers: the extractor logs and skips the block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectiveError {
    #[error("{tag} block skipped: {reason}")]
    Malformed { tag: String, reason: String },
}

// ─── Document errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(
        "document storage quota exceeded: {used_bytes} used + {requested_bytes} requested > {limit_bytes} allowed"
    )]
    QuotaExceeded {
        used_bytes: u64,
        requested_bytes: u64,
        limit_bytes: u64,
    },

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("storage: {0}")]
    Storage(#[from] StorageError),
}

// ─── Conversation errors ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("conversation not found: {0}")]
    NotFound(String),

    #[error("storage: {0}")]
    Storage(#[from] StorageError),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, PlanwiseError>;
