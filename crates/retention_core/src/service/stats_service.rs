//! Dashboard statistics derived from the stored collections.
//!
//! # Invariants
//! - Every call re-reads the store; nothing is cached.
//! - Failures yield zero counts, never an error.

use super::load_or_empty;
use crate::model::record::{CompletedRecord, RecordId, SavedRecord};
use crate::retention::policy::{ExpirationStatus, RetentionPolicy};
use crate::store::{RecordStore, COMPLETED_RECORDS_KEY, SAVED_RECORDS_KEY};
use serde::Serialize;
use std::sync::Arc;

const MODULE: &str = "stats";

/// Collection sizes shown on the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordStats {
    pub completed_count: usize,
    pub saved_count: usize,
}

/// Per-draft expiration line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirationDetail {
    pub id: RecordId,
    pub subject_name: String,
    pub days_until_expiration: i64,
    pub status: ExpirationStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirationBreakdown {
    pub urgent_count: usize,
    pub warning_count: usize,
    pub safe_count: usize,
    /// In stored order.
    pub records: Vec<ExpirationDetail>,
}

impl ExpirationBreakdown {
    fn tally(&mut self, detail: ExpirationDetail) {
        match detail.status {
            ExpirationStatus::Urgent => self.urgent_count += 1,
            ExpirationStatus::Warning => self.warning_count += 1,
            ExpirationStatus::Safe => self.safe_count += 1,
        }
        self.records.push(detail);
    }
}

pub struct StatsService<S: RecordStore> {
    store: Arc<S>,
    policy: RetentionPolicy,
}

impl<S: RecordStore> StatsService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_policy(store, RetentionPolicy::default())
    }

    pub fn with_policy(store: Arc<S>, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    pub fn compute_stats(&self) -> RecordStats {
        let completed =
            load_or_empty::<_, CompletedRecord>(self.store.as_ref(), COMPLETED_RECORDS_KEY, MODULE);
        let saved = load_or_empty::<_, SavedRecord>(self.store.as_ref(), SAVED_RECORDS_KEY, MODULE);
        RecordStats {
            completed_count: completed.len(),
            saved_count: saved.len(),
        }
    }

    pub fn compute_expiration_breakdown(&self, now_ms: i64) -> ExpirationBreakdown {
        let saved = load_or_empty::<_, SavedRecord>(self.store.as_ref(), SAVED_RECORDS_KEY, MODULE);
        let mut breakdown = ExpirationBreakdown::default();
        for record in saved.records() {
            breakdown.tally(ExpirationDetail {
                id: record.id.clone(),
                subject_name: record.subject_name.clone(),
                days_until_expiration: self.policy.days_until_expiration(record, now_ms),
                status: self.policy.status(record, now_ms),
            });
        }
        breakdown
    }
}
