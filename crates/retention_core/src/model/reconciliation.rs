//! Reconciliation log persisted after every successful pass.
//!
//! # Invariants
//! - `next_check_at == last_check_at + interval` for the interval the pass
//!   ran with.

use serde::{Deserialize, Serialize};

/// Outcome of the most recent reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationLog {
    pub last_check_at: i64,
    pub next_check_at: i64,
    pub records_updated_last_run: u64,
    pub total_records_last_run: u64,
}

impl ReconciliationLog {
    /// Log used when nothing has been persisted yet: checked "now", next
    /// check one interval later, no records touched.
    pub fn initial(now_ms: i64, interval_ms: i64) -> Self {
        Self::after_pass(now_ms, interval_ms, 0, 0)
    }

    pub fn after_pass(now_ms: i64, interval_ms: i64, updated: u64, total: u64) -> Self {
        Self {
            last_check_at: now_ms,
            next_check_at: now_ms.saturating_add(interval_ms),
            records_updated_last_run: updated,
            total_records_last_run: total,
        }
    }

    pub fn is_due(&self, now_ms: i64) -> bool {
        now_ms >= self.next_check_at
    }
}
