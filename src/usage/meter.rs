use super::types::{UsageRecord, UsageStatus};
use crate::config::UsageConfig;
use crate::error::StorageError;
use crate::store::{KvStore, get_json, keys, set_json};
use crate::utils::{Clock, SystemClock};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Tolerance for float accumulation when comparing against the 100% cap.
const CAPACITY_EPSILON: f64 = 1e-9;

/// Monthly percentage budget gate.
///
/// Store failures never block a turn: reads fall back to a fresh record and
/// writes are logged and dropped.
pub struct UsageMeter {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    config: UsageConfig,
    // Serializes read-modify-write cycles on the single record.
    write_lock: Mutex<()>,
}

impl UsageMeter {
    pub fn new(store: Arc<dyn KvStore>, config: UsageConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn KvStore>, config: UsageConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            config,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn has_reached_limit(&self) -> bool {
        let record = self.current().await;
        !record.unlimited_mode && record.percentage_used >= 100.0
    }

    pub async fn has_enough_capacity(&self, required_pct: f64) -> bool {
        let record = self.current().await;
        record.unlimited_mode
            || record.percentage_used + required_pct <= 100.0 + CAPACITY_EPSILON
    }

    /// Deterministic, bounded cost of sending `message_text`.
    pub fn estimate_cost(&self, message_text: &str) -> f64 {
        let chars = message_text.chars().count();
        #[allow(clippy::cast_precision_loss)]
        let raw = self.config.min_cost_pct + chars as f64 / f64::from(self.config.chars_per_pct);
        raw.clamp(self.config.min_cost_pct, self.config.max_cost_pct)
    }

    pub async fn record_usage(&self, pct: f64) {
        if let Err(error) = self.try_record_usage(pct).await {
            tracing::warn!("usage: failed to record {pct:.2}%: {error}");
        }
    }

    /// Returns `true` when the counter was reset.
    pub async fn reset_if_due(&self) -> bool {
        let _guard = self.write_lock.lock().await;
        match self.load_and_roll().await {
            Ok((_, reset)) => reset,
            Err(error) => {
                tracing::warn!("usage: reset check failed: {error}");
                false
            }
        }
    }

    /// Operator reset regardless of the schedule.
    pub async fn reset_now(&self) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let now = self.clock.now();
        let mut record = self.load_raw().await?.unwrap_or_else(|| UsageRecord::fresh(now));
        record.reset(now);
        set_json(self.store.as_ref(), keys::USAGE_RECORD, &record).await
    }

    pub async fn enable_unlimited_mode(&self) -> Result<(), StorageError> {
        self.set_unlimited(true).await
    }

    pub async fn disable_unlimited_mode(&self) -> Result<(), StorageError> {
        self.set_unlimited(false).await
    }

    pub async fn status(&self) -> UsageStatus {
        let record = self.current().await;
        UsageStatus::from_record(&record, self.clock.now())
    }

    async fn set_unlimited(&self, enabled: bool) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let (mut record, _) = self.load_and_roll().await?;
        record.unlimited_mode = enabled;
        set_json(self.store.as_ref(), keys::USAGE_RECORD, &record).await?;
        tracing::info!(
            "usage: unlimited mode {}",
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    async fn try_record_usage(&self, pct: f64) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let (mut record, _) = self.load_and_roll().await?;
        if record.unlimited_mode {
            return Ok(());
        }
        record.percentage_used = (record.percentage_used + pct.max(0.0)).min(100.0);
        set_json(self.store.as_ref(), keys::USAGE_RECORD, &record).await
    }

    /// Current record with any due reset applied; permissive on failure.
    async fn current(&self) -> UsageRecord {
        let _guard = self.write_lock.lock().await;
        match self.load_and_roll().await {
            Ok((record, _)) => record,
            Err(error) => {
                tracing::warn!("usage: store unavailable, treating as within limits: {error}");
                UsageRecord::fresh(self.clock.now())
            }
        }
    }

    /// Stored record, or `None` when absent. An undecodable record is
    /// treated as absent so the next write replaces it.
    async fn load_raw(&self) -> Result<Option<UsageRecord>, StorageError> {
        match get_json(self.store.as_ref(), keys::USAGE_RECORD).await {
            Err(StorageError::Codec(error)) => {
                tracing::warn!("usage: discarding undecodable record: {error}");
                Ok(None)
            }
            other => other,
        }
    }

    /// Caller must hold `write_lock`.
    async fn load_and_roll(&self) -> Result<(UsageRecord, bool), StorageError> {
        let now = self.clock.now();
        let Some(mut record) = self.load_raw().await? else {
            let record = UsageRecord::fresh(now);
            set_json(self.store.as_ref(), keys::USAGE_RECORD, &record).await?;
            return Ok((record, false));
        };

        if !record.is_reset_due(now) {
            return Ok((record, false));
        }

        record.reset(now);
        set_json(self.store.as_ref(), keys::USAGE_RECORD, &record).await?;
        tracing::info!(
            "usage: monthly reset applied, next reset at {}",
            record.next_reset_at
        );
        Ok((record, true))
    }
}
