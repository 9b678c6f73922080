//! Namespaced asynchronous key→string persistence.
//!
//! Every stateful component (usage meter, context cache, conversations,
//! document library) goes through [`KvStore`], so the backing engine can be
//! swapped without touching callers.

pub mod keys;
pub mod memory;
pub mod sqlite;

pub use memory::MemoryKvStore;
pub use sqlite::SqliteKvStore;

use crate::error::StorageError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Async key-value persistence contract.
pub trait KvStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()>;

    /// Returns `true` when a value was present.
    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool>;

    /// Keys starting with `prefix`, sorted ascending.
    fn keys_with_prefix<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>>;
}

/// Load and decode a JSON value stored under `key`.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encode `value` as JSON and store it under `key`.
pub async fn set_json<T: Serialize + ?Sized>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw).await
}

#[cfg(test)]
mod tests {
    use super::{KvStore, MemoryKvStore, get_json, set_json};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn json_helpers_round_trip_through_store() {
        let store = MemoryKvStore::new();
        let sample = Sample {
            name: "alpha".into(),
            count: 3,
        };
        set_json(&store, "sample", &sample).await.unwrap();

        let loaded: Option<Sample> = get_json(&store, "sample").await.unwrap();
        assert_eq!(loaded, Some(sample));
    }

    #[tokio::test]
    async fn get_json_reports_codec_errors() {
        let store = MemoryKvStore::new();
        store.set("sample", "not json").await.unwrap();

        let result: Result<Option<Sample>, _> = get_json(&store, "sample").await;
        assert!(result.is_err());
    }
}
