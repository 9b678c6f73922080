//! Size- and time-bounded document context for prompt injection.

use super::documents::{Document, DocumentSource};
use crate::config::ContextConfig;
use crate::store::{KvStore, get_json, keys, set_json};
use crate::utils::{Clock, SystemClock, truncate_chars};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Injected when sharing is on but nothing usable is stored.
pub const NO_DOCUMENTS_FALLBACK: &str = "No personal documents are available.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntry {
    text: String,
    cached_at: DateTime<Utc>,
}

pub struct DocumentContextCache {
    store: Arc<dyn KvStore>,
    source: Arc<dyn DocumentSource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    max_chars: usize,
    rebuild_lock: Mutex<()>,
}

impl DocumentContextCache {
    pub fn new(
        store: Arc<dyn KvStore>,
        source: Arc<dyn DocumentSource>,
        config: &ContextConfig,
    ) -> Self {
        Self::with_clock(store, source, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn KvStore>,
        source: Arc<dyn DocumentSource>,
        config: &ContextConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            source,
            clock,
            ttl: i64::try_from(config.ttl_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
            max_chars: config.max_context_chars,
            rebuild_lock: Mutex::new(()),
        }
    }

    /// Current context text. Empty when sharing is disabled; otherwise never
    /// empty and never longer than the configured character budget.
    pub async fn get_context(&self, force_refresh: bool) -> String {
        match self.source.knowledge_sharing_enabled().await {
            Ok(true) => {}
            Ok(false) => return String::new(),
            Err(error) => {
                tracing::warn!("knowledge sharing toggle unreadable, sharing nothing: {error}");
                return String::new();
            }
        }

        let _guard = self.rebuild_lock.lock().await;

        if !force_refresh && let Some(text) = self.fresh_entry().await {
            tracing::debug!(chars = text.chars().count(), "document context cache hit");
            return text;
        }

        let text = match self.source.documents().await {
            Ok(documents) => compose_context(&documents, self.max_chars),
            Err(error) => {
                tracing::warn!("document source unavailable: {error}");
                return fallback(self.max_chars);
            }
        };

        let entry = CacheEntry {
            text,
            cached_at: self.clock.now(),
        };
        if let Err(error) = set_json(self.store.as_ref(), keys::CONTEXT_CACHE, &entry).await {
            tracing::warn!("failed to persist document context cache: {error}");
        }
        entry.text
    }

    /// Drop the cached entry so the next read rebuilds.
    pub async fn invalidate(&self) {
        if let Err(error) = self.store.remove(keys::CONTEXT_CACHE).await {
            tracing::warn!("failed to invalidate document context cache: {error}");
        }
    }

    async fn fresh_entry(&self) -> Option<String> {
        let entry = match get_json::<CacheEntry>(self.store.as_ref(), keys::CONTEXT_CACHE).await {
            Ok(entry) => entry?,
            Err(error) => {
                tracing::warn!("document context cache unreadable, rebuilding: {error}");
                return None;
            }
        };
        let age = self.clock.now() - entry.cached_at;
        (age >= Duration::zero() && age < self.ttl).then_some(entry.text)
    }
}

fn format_chunk(document: &Document) -> String {
    format!(
        "=== DOCUMENT: {name} ===\n{content}\n=== END OF DOCUMENT: {name} ===\n\n",
        name = document.name,
        content = document.content.trim(),
    )
}

fn fallback(max_chars: usize) -> String {
    truncate_chars(NO_DOCUMENTS_FALLBACK, max_chars).to_string()
}

/// App-context document first, then the rest in source order. Stops at the
/// first chunk that does not fit; only a leading chunk is ever truncated.
pub(crate) fn compose_context(documents: &[Document], max_chars: usize) -> String {
    let ordered = documents
        .iter()
        .filter(|doc| doc.is_app_context)
        .chain(documents.iter().filter(|doc| !doc.is_app_context))
        .filter(|doc| !doc.content.trim().is_empty());

    let mut text = String::new();
    let mut used = 0usize;
    for document in ordered {
        let chunk = format_chunk(document);
        let len = chunk.chars().count();
        if used + len <= max_chars {
            text.push_str(&chunk);
            used += len;
            continue;
        }
        if text.is_empty() {
            text.push_str(truncate_chars(&chunk, max_chars));
        }
        break;
    }

    let text = text.trim_end();
    if text.is_empty() {
        fallback(max_chars)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::detection::DocumentKind;
    use crate::context::documents::SourceFuture;
    use crate::error::DocumentError;
    use crate::store::MemoryKvStore;
    use crate::utils::FixedClock;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct StaticSource {
        docs: std::sync::Mutex<Vec<Document>>,
        sharing: AtomicBool,
        reads: AtomicUsize,
    }

    impl StaticSource {
        fn new(docs: Vec<Document>) -> Arc<Self> {
            Arc::new(Self {
                docs: std::sync::Mutex::new(docs),
                sharing: AtomicBool::new(true),
                reads: AtomicUsize::new(0),
            })
        }
    }

    impl DocumentSource for StaticSource {
        fn knowledge_sharing_enabled(&self) -> SourceFuture<'_, bool> {
            let enabled = self.sharing.load(Ordering::SeqCst);
            Box::pin(async move { Ok(enabled) })
        }

        fn documents(&self) -> SourceFuture<'_, Vec<Document>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let docs = self.docs.lock().unwrap().clone();
            Box::pin(async move { Ok::<_, DocumentError>(docs) })
        }
    }

    fn doc(name: &str, content: &str, app: bool) -> Document {
        Document {
            id: name.into(),
            name: name.into(),
            kind: DocumentKind::Text,
            content: content.into(),
            is_app_context: app,
            added_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn config(max_chars: usize) -> ContextConfig {
        ContextConfig {
            ttl_secs: 600,
            max_context_chars: max_chars,
            ..ContextConfig::default()
        }
    }

    #[test]
    fn app_context_document_comes_first() {
        let docs = vec![doc("notes", "n", false), doc("app", "a", true)];
        let text = compose_context(&docs, 10_000);
        let app_at = text.find("=== DOCUMENT: app ===").unwrap();
        let notes_at = text.find("=== DOCUMENT: notes ===").unwrap();
        assert!(app_at < notes_at);
        assert!(text.ends_with("=== END OF DOCUMENT: notes ==="));
    }

    #[test]
    fn oversized_first_document_is_truncated_to_budget() {
        let docs = vec![
            doc("big", &"x".repeat(500), false),
            doc("second", "small", false),
            doc("third", "small", false),
        ];
        let text = compose_context(&docs, 100);
        assert!(text.chars().count() <= 100);
        assert!(text.starts_with("=== DOCUMENT: big ==="));
        assert!(!text.contains("second"));
    }

    #[test]
    fn concatenation_stops_at_first_chunk_that_does_not_fit() {
        let first = doc("one", "short", false);
        let budget = format_chunk(&first).chars().count() + 10;
        let docs = vec![first, doc("two", &"y".repeat(200), false), doc("three", "z", false)];
        let text = compose_context(&docs, budget);
        assert!(text.contains("one"));
        assert!(!text.contains("two"));
        assert!(!text.contains("three"));
        assert!(text.chars().count() <= budget);
    }

    #[test]
    fn empty_documents_are_skipped_and_fallback_is_used() {
        let docs = vec![doc("blank", "   \n", false)];
        assert_eq!(compose_context(&docs, 1000), NO_DOCUMENTS_FALLBACK);
        assert_eq!(compose_context(&[], 2), "No");
    }

    #[tokio::test]
    async fn disabled_sharing_yields_empty_context() {
        let source = StaticSource::new(vec![doc("a", "content", false)]);
        source.sharing.store(false, Ordering::SeqCst);
        let cache =
            DocumentContextCache::new(Arc::new(MemoryKvStore::new()), source.clone(), &config(1000));
        assert_eq!(cache.get_context(false).await, "");
        assert_eq!(source.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fresh_entry_is_reused_until_ttl_expires() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(start));
        let source = StaticSource::new(vec![doc("a", "first version", false)]);
        let cache = DocumentContextCache::with_clock(
            Arc::new(MemoryKvStore::new()),
            source.clone(),
            &config(1000),
            clock.clone(),
        );

        assert!(cache.get_context(false).await.contains("first version"));
        *source.docs.lock().unwrap() = vec![doc("a", "second version", false)];

        clock.advance(Duration::minutes(9));
        assert!(cache.get_context(false).await.contains("first version"));
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);

        clock.advance(Duration::minutes(2));
        assert!(cache.get_context(false).await.contains("second version"));
        assert_eq!(source.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn force_refresh_and_invalidate_rebuild() {
        let source = StaticSource::new(vec![doc("a", "v1", false)]);
        let cache =
            DocumentContextCache::new(Arc::new(MemoryKvStore::new()), source.clone(), &config(1000));
        cache.get_context(false).await;

        *source.docs.lock().unwrap() = vec![doc("a", "v2", false)];
        assert!(cache.get_context(true).await.contains("v2"));

        *source.docs.lock().unwrap() = vec![doc("a", "v3", false)];
        cache.invalidate().await;
        assert!(cache.get_context(false).await.contains("v3"));
        assert_eq!(source.reads.load(Ordering::SeqCst), 3);
    }
}
