use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Persisted monthly usage budget, expressed in percentage points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub percentage_used: f64,
    pub last_reset_at: DateTime<Utc>,
    pub next_reset_at: DateTime<Utc>,
    #[serde(default)]
    pub unlimited_mode: bool,
}

impl UsageRecord {
    #[must_use]
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            percentage_used: 0.0,
            last_reset_at: now,
            next_reset_at: first_instant_of_next_month(now),
            unlimited_mode: false,
        }
    }

    #[must_use]
    pub fn is_reset_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_reset_at
    }

    /// Zero the counter and schedule the next reset. Unlimited mode survives.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.percentage_used = 0.0;
        self.last_reset_at = now;
        self.next_reset_at = first_instant_of_next_month(now);
    }

    /// Percentage shown to callers; always 0 under unlimited mode.
    #[must_use]
    pub fn reported_percentage(&self) -> f64 {
        if self.unlimited_mode {
            0.0
        } else {
            self.percentage_used.clamp(0.0, 100.0)
        }
    }

    #[must_use]
    pub fn remaining_percentage(&self) -> f64 {
        100.0 - self.reported_percentage()
    }
}

/// Snapshot returned by [`super::UsageMeter::status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStatus {
    pub percentage_used: f64,
    pub remaining_percentage: f64,
    pub unlimited_mode: bool,
    pub next_reset_at: DateTime<Utc>,
    pub seconds_until_reset: i64,
}

impl UsageStatus {
    #[must_use]
    pub fn from_record(record: &UsageRecord, now: DateTime<Utc>) -> Self {
        Self {
            percentage_used: record.reported_percentage(),
            remaining_percentage: record.remaining_percentage(),
            unlimited_mode: record.unlimited_mode,
            next_reset_at: record.next_reset_at,
            seconds_until_reset: (record.next_reset_at - now).num_seconds().max(0),
        }
    }
}

/// Midnight UTC on the first day of the month after `now`.
#[must_use]
pub fn first_instant_of_next_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };

    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map_or_else(|| now + Duration::days(31), |start| start.and_utc())
}
