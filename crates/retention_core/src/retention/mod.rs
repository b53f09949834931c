//! Retention arithmetic for saved drafts.
//!
//! Everything here is pure: callers pass `now` explicitly and get numbers
//! back. Persistence and scheduling live in `store` and `service`.

pub mod policy;
