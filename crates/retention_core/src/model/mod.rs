//! Structured record shapes persisted by the retention engine.
//!
//! # Responsibility
//! - Define the draft, completed, and reconciliation-log records.
//! - Validate record shape before it is written or after it is read.
//!
//! # Invariants
//! - Timestamps are Unix epoch milliseconds.
//! - Only `SavedRecord::saved_at` is mutated by the engine.

pub mod reconciliation;
pub mod record;
