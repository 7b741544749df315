//! Submission path
//!
//! normalize → store lookup (dedup short-circuit) → in-flight registry →
//! race → `insert_if_absent` → response.
//!
//! The in-flight registry keys outstanding races by fingerprint. Concurrent
//! submissions of the same new text join the one race already running
//! instead of launching their own AI calls. Each race + commit runs in its
//! own task, so it completes even if the submitting request goes away, and
//! removes its registry entry once committed. Uniqueness does not depend on
//! the registry: a submission that misses it still ends in
//! `insert_if_absent`, which returns the committed record.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use super::alerter::WebhookAlerter;
use super::normalizer::{InputError, NormalizedText, Normalizer};
use super::race_arbiter::RaceArbiter;
use crate::db::{FeedbackStore, InsertOutcome};
use crate::models::{FeedbackRecord, NewFeedback};

/// Submission failures visible to the caller
///
/// AI problems never appear here: they resolve to the fallback result.
#[derive(Debug, Clone, Error)]
pub enum IngestError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("Storage failure: {0}")]
    Store(Arc<aegis_common::Error>),

    #[error("Classification task failed: {0}")]
    Task(String),
}

impl From<aegis_common::Error> for IngestError {
    fn from(err: aegis_common::Error) -> Self {
        IngestError::Store(Arc::new(err))
    }
}

/// Response of a submission
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub record: FeedbackRecord,
    /// True if this submission did not create the record
    pub duplicate: bool,
}

type CommitResult = Result<(FeedbackRecord, bool), IngestError>;
type PendingCommit = Shared<BoxFuture<'static, CommitResult>>;

#[derive(Clone)]
pub struct IngestService {
    normalizer: Normalizer,
    store: FeedbackStore,
    arbiter: Arc<RaceArbiter>,
    alerter: WebhookAlerter,
    in_flight: Arc<Mutex<HashMap<String, PendingCommit>>>,
}

impl IngestService {
    pub fn new(normalizer: Normalizer, store: FeedbackStore, arbiter: RaceArbiter, alerter: WebhookAlerter) -> Self {
        Self {
            normalizer,
            store,
            arbiter: Arc::new(arbiter),
            alerter,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &FeedbackStore {
        &self.store
    }

    /// Classify and persist one submission
    pub async fn submit(&self, raw: &str) -> Result<SubmitOutcome, IngestError> {
        let normalized = self.normalizer.normalize(raw)?;

        if let Some(existing) = self.store.lookup(&normalized.fingerprint).await? {
            tracing::debug!(id = %existing.id, "Duplicate submission served from store");
            return Ok(SubmitOutcome {
                record: existing,
                duplicate: true,
            });
        }

        let (pending, joined) = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(&normalized.fingerprint) {
                Some(pending) => (pending.clone(), true),
                None => {
                    let pending = self.spawn_commit(raw.to_string(), normalized.clone());
                    in_flight.insert(normalized.fingerprint.clone(), pending.clone());
                    (pending, false)
                }
            }
        };

        if joined {
            tracing::debug!(fingerprint = %normalized.fingerprint, "Joined in-flight race");
        }

        let (record, inserted) = pending.await?;
        Ok(SubmitOutcome {
            record,
            duplicate: joined || !inserted,
        })
    }

    fn spawn_commit(&self, raw: String, normalized: NormalizedText) -> PendingCommit {
        let service = self.clone();
        let handle = tokio::spawn(async move {
            let fingerprint = normalized.fingerprint.clone();
            let result = service.race_and_commit(raw, normalized).await;
            service.in_flight.lock().await.remove(&fingerprint);
            result
        });

        async move {
            handle
                .await
                .unwrap_or_else(|e| Err(IngestError::Task(e.to_string())))
        }
        .boxed()
        .shared()
    }

    async fn race_and_commit(&self, raw: String, normalized: NormalizedText) -> CommitResult {
        let outcome = self.arbiter.race(&normalized.sanitized).await;
        let source = outcome.source();

        let new = NewFeedback {
            raw_content: raw,
            sanitized_content: normalized.sanitized,
            fingerprint: normalized.fingerprint,
            classification: outcome.classification,
            source,
            provider: outcome.provider,
            needs_review: outcome.needs_review,
        };

        match self.store.insert_if_absent(new).await? {
            InsertOutcome::Inserted(record) => {
                tracing::info!(
                    id = %record.id,
                    source = %record.source,
                    sentiment = %record.sentiment,
                    urgent = record.urgent,
                    elapsed_ms = outcome.elapsed.as_millis() as u64,
                    "Feedback classified"
                );
                if record.urgent {
                    self.alerter.notify_urgent(&record);
                }
                Ok((record, true))
            }
            InsertOutcome::Existing(record) => {
                tracing::debug!(id = %record.id, "Race result discarded, record already committed");
                Ok((record, false))
            }
        }
    }
}
