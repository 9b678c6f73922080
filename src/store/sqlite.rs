use super::{KvStore, StoreFuture};
use crate::error::StorageError;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

const KV_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv_entries (
    namespace  TEXT NOT NULL,
    key        TEXT NOT NULL,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (namespace, key)
)";

/// SQLite-backed store using a sqlx async pool. Every key lives under one
/// namespace so several logical users can share a database file.
pub struct SqliteKvStore {
    pool: SqlitePool,
    namespace: String,
}

impl SqliteKvStore {
    /// Create a store with an existing pool and run migrations.
    pub async fn new(pool: SqlitePool, namespace: &str) -> Result<Self, StorageError> {
        sqlx::query(KV_SCHEMA).execute(&pool).await?;
        Ok(Self {
            pool,
            namespace: namespace.to_string(),
        })
    }

    /// Open (creating if missing) the database file at `path`.
    pub async fn open(path: &Path, namespace: &str) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| StorageError::Backend(error.to_string()))?;
        }

        let url = format!("sqlite://{}", path.display());
        let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::new(pool, namespace).await
    }
}

impl KvStore for SqliteKvStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let row: Option<(String,)> =
                sqlx::query_as("SELECT value FROM kv_entries WHERE namespace = $1 AND key = $2")
                    .bind(&self.namespace)
                    .bind(key)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row.map(|(value,)| value))
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let timestamp = Utc::now().to_rfc3339();
            sqlx::query(
                "INSERT INTO kv_entries (namespace, key, value, updated_at)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT(namespace, key) DO UPDATE
                 SET value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(&self.namespace)
            .bind(key)
            .bind(value)
            .bind(&timestamp)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM kv_entries WHERE namespace = $1 AND key = $2")
                .bind(&self.namespace)
                .bind(key)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn keys_with_prefix<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            let rows: Vec<(String,)> = sqlx::query_as(
                "SELECT key FROM kv_entries
                 WHERE namespace = $1 AND substr(key, 1, length($2)) = $2
                 ORDER BY key ASC",
            )
            .bind(&self.namespace)
            .bind(prefix)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(|(key,)| key).collect())
        })
    }
}
