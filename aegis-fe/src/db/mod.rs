//! Database access for the feedback service
//!
//! Schema creation and settings seeding live in `aegis_common::db`; this
//! module holds the feedback store and its write discipline.

pub mod feedback;
pub mod retry;

pub use feedback::{FeedbackStore, InsertOutcome, ResolveOutcome};
