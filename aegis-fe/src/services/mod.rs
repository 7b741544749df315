//! Classification services
//!
//! Leaves first: normalizer, heuristic classifier, AI completion client and
//! its output validation, then the race arbiter, the submission path and the
//! reconciliation worker that build on them.

pub mod ai_client;
pub mod alerter;
pub mod heuristic;
pub mod ingest;
pub mod normalizer;
pub mod race_arbiter;
pub mod reconciler;
pub mod validation;

pub use ai_client::{build_client, AiError, CompletionClient, DisabledClient, MockBehavior, MockCompletionClient};
pub use alerter::WebhookAlerter;
pub use ingest::{IngestError, IngestService, SubmitOutcome};
pub use normalizer::{InputError, Normalizer};
pub use race_arbiter::{FallbackReason, RaceArbiter, RaceOutcome, Winner};
pub use reconciler::{spawn_reconciler, ReconcileError, ReconcileHandle, Reconciler, SweepReport};
pub use validation::{validate_completion, AiVerdict, SchemaError};
