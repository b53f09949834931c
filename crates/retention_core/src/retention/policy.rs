//! Age, days-remaining, and status-bucket computations.
//!
//! # Invariants
//! - A record's age is never negative; a `saved_at` ahead of `now` counts
//!   as age zero.
//! - A renewed record sits at exactly `extension_target_days` remaining,
//!   which is never below `min_days_remaining`, so renewal is idempotent
//!   for a fixed `now`.

use crate::model::record::SavedRecord;
use serde::{Deserialize, Serialize};

pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Absolute lifetime of a draft, measured from `saved_at`.
pub const AUTO_DELETE_THRESHOLD_DAYS: i64 = 30;
/// Drafts with fewer days left than this are renewed.
pub const MIN_DAYS_REMAINING: i64 = 5;
/// Days remaining a renewed draft is reset to.
pub const EXTENSION_TARGET_DAYS: i64 = MIN_DAYS_REMAINING + 5;
/// Period between reconciliation passes.
pub const CHECK_INTERVAL_DAYS: i64 = 5;

const URGENT_BELOW_DAYS: i64 = 5;
const WARNING_BELOW_DAYS: i64 = 10;

/// Display bucket derived from days until expiration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpirationStatus {
    /// Fewer than 5 days left.
    Urgent,
    /// 5 to 9 days left.
    Warning,
    /// 10 or more days left.
    Safe,
}

impl ExpirationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::Warning => "warning",
            Self::Safe => "safe",
        }
    }
}

/// Retention thresholds, in whole days.
///
/// `Default` yields the production constants above; other values exist so
/// hosts can exercise the engine on compressed timelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub auto_delete_threshold_days: i64,
    pub min_days_remaining: i64,
    pub extension_target_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            auto_delete_threshold_days: AUTO_DELETE_THRESHOLD_DAYS,
            min_days_remaining: MIN_DAYS_REMAINING,
            extension_target_days: EXTENSION_TARGET_DAYS,
        }
    }
}

impl RetentionPolicy {
    /// Whole days elapsed since the record was last saved (floored).
    pub fn days_since_saved(&self, record: &SavedRecord, now_ms: i64) -> i64 {
        now_ms.saturating_sub(record.saved_at).max(0) / DAY_MS
    }

    pub fn days_until_expiration(&self, record: &SavedRecord, now_ms: i64) -> i64 {
        self.auto_delete_threshold_days - self.days_since_saved(record, now_ms)
    }

    pub fn status(&self, record: &SavedRecord, now_ms: i64) -> ExpirationStatus {
        status_for_days_remaining(self.days_until_expiration(record, now_ms))
    }

    pub fn needs_renewal(&self, record: &SavedRecord, now_ms: i64) -> bool {
        self.days_until_expiration(record, now_ms) < self.min_days_remaining
    }

    /// The `saved_at` that leaves a record with exactly
    /// `extension_target_days` remaining at `now_ms`.
    pub fn renewed_saved_at(&self, now_ms: i64) -> i64 {
        let backdate_days = self.auto_delete_threshold_days - self.extension_target_days;
        now_ms.saturating_sub(backdate_days.saturating_mul(DAY_MS))
    }
}

/// Maps days remaining to a bucket. Boundaries are strict: 5 is `Warning`,
/// 10 is `Safe`.
pub fn status_for_days_remaining(days_remaining: i64) -> ExpirationStatus {
    if days_remaining < URGENT_BELOW_DAYS {
        ExpirationStatus::Urgent
    } else if days_remaining < WARNING_BELOW_DAYS {
        ExpirationStatus::Warning
    } else {
        ExpirationStatus::Safe
    }
}
