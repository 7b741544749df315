//! Reconciliation worker
//!
//! Re-runs AI classification for FALLBACK records without deadline pressure
//! and upgrades them in place. Sweeps run on a timer or on demand; the store
//! write lock is taken only per committed upgrade, never across an AI call.
//! A failing record is logged and left for the next sweep.
//!
//! Drift detection: a record is flagged `needs_review` when the AI result
//! makes it urgent where the fallback did not, or when the AI's own urgency
//! flag contradicts the urgency rule.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::ai_client::{AiError, CompletionClient};
use super::validation::validate_completion;
use crate::db::FeedbackStore;
use crate::models::{AiUpgrade, FeedbackRecord};

/// Counters for one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// FALLBACK records selected
    pub candidates: usize,
    /// Records moved to AI
    pub upgraded: usize,
    /// AI call or validation failed; left as FALLBACK
    pub failed: usize,
    /// Already upgraded by someone else before our commit
    pub skipped: usize,
}

#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    #[error("Reconciliation worker is not running")]
    WorkerStopped,

    #[error("Sweep failed: {0}")]
    Sweep(String),
}

enum RecordOutcome {
    Upgraded,
    Failed,
    Skipped,
}

pub struct Reconciler {
    store: FeedbackStore,
    ai: Arc<dyn CompletionClient>,
    batch_size: usize,
    concurrency: usize,
    call_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        store: FeedbackStore,
        ai: Arc<dyn CompletionClient>,
        batch_size: usize,
        concurrency: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            ai,
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
            call_timeout,
        }
    }

    /// Process one bounded batch of FALLBACK records
    ///
    /// Only failing to read the batch is an error; per-record failures are
    /// counted in the report.
    pub async fn run_sweep(&self) -> aegis_common::Result<SweepReport> {
        let batch = self.store.fallback_batch(self.batch_size).await?;
        let mut report = SweepReport {
            candidates: batch.len(),
            ..Default::default()
        };

        if batch.is_empty() {
            tracing::trace!("Reconciliation sweep: nothing to do");
            return Ok(report);
        }

        let outcomes: Vec<RecordOutcome> = stream::iter(batch)
            .map(|record| self.reconcile_record(record))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                RecordOutcome::Upgraded => report.upgraded += 1,
                RecordOutcome::Failed => report.failed += 1,
                RecordOutcome::Skipped => report.skipped += 1,
            }
        }

        tracing::info!(
            candidates = report.candidates,
            upgraded = report.upgraded,
            failed = report.failed,
            skipped = report.skipped,
            "Reconciliation sweep finished"
        );
        Ok(report)
    }

    async fn reconcile_record(&self, record: FeedbackRecord) -> RecordOutcome {
        let text = record.sanitized_content.as_str();

        let body = match tokio::time::timeout(self.call_timeout, self.ai.complete(text, self.call_timeout)).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                tracing::warn!(id = %record.id, error = %e, "AI still failing, record stays fallback");
                return RecordOutcome::Failed;
            }
            Err(_) => {
                tracing::warn!(
                    id = %record.id,
                    error = %AiError::Timeout(self.call_timeout),
                    "AI still failing, record stays fallback"
                );
                return RecordOutcome::Failed;
            }
        };

        let verdict = match validate_completion(&body) {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(id = %record.id, error = %e, "AI output rejected during reconciliation");
                return RecordOutcome::Failed;
            }
        };

        let (classification, disagreement) = verdict.into_classification(text);
        let escalated = classification.urgent && !record.urgent;
        if escalated || disagreement {
            tracing::warn!(id = %record.id, escalated, disagreement, "Classification drift, flagging for review");
        }

        let upgrade = AiUpgrade {
            classification,
            provider: self.ai.provider().to_string(),
            needs_review: escalated || disagreement,
        };

        match self.store.upgrade_to_ai(record.id, &upgrade).await {
            Ok(true) => {
                tracing::debug!(id = %record.id, provider = %upgrade.provider, "Record upgraded to AI");
                RecordOutcome::Upgraded
            }
            Ok(false) => RecordOutcome::Skipped,
            Err(e) => {
                tracing::error!(id = %record.id, error = %e, "Failed to commit reconciliation upgrade");
                RecordOutcome::Failed
            }
        }
    }
}

type SweepReply = oneshot::Sender<Result<SweepReport, ReconcileError>>;

/// Force-trigger handle for a running worker
#[derive(Clone)]
pub struct ReconcileHandle {
    trigger: mpsc::Sender<SweepReply>,
}

impl ReconcileHandle {
    /// Run a sweep now and wait for its report
    pub async fn force_sweep(&self) -> Result<SweepReport, ReconcileError> {
        let (reply, receiver) = oneshot::channel();
        self.trigger
            .send(reply)
            .await
            .map_err(|_| ReconcileError::WorkerStopped)?;
        receiver.await.map_err(|_| ReconcileError::WorkerStopped)?
    }
}

/// Start the background worker
///
/// Sweeps every `interval` and on each [`ReconcileHandle::force_sweep`]
/// until `cancel` fires. Sweeps never overlap.
pub fn spawn_reconciler(
    reconciler: Reconciler,
    interval: Duration,
    cancel: CancellationToken,
) -> (ReconcileHandle, JoinHandle<()>) {
    let (trigger, mut requests) = mpsc::channel::<SweepReply>(8);

    let task = tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "Reconciliation worker started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Reconciliation worker stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = reconciler.run_sweep().await {
                        tracing::warn!(error = %e, "Scheduled reconciliation sweep failed");
                    }
                }
                Some(reply) = requests.recv() => {
                    tracing::info!("Forced reconciliation sweep");
                    let result = reconciler
                        .run_sweep()
                        .await
                        .map_err(|e| ReconcileError::Sweep(e.to_string()));
                    // Requester may have given up
                    let _ = reply.send(result);
                }
            }
        }
    });

    (ReconcileHandle { trigger }, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Classification, ClassificationSource, NewFeedback, Sentiment, Topic};
    use crate::services::ai_client::{MockBehavior, MockCompletionClient};
    use crate::services::normalizer::fingerprint;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, FeedbackStore) {
        let temp_dir = TempDir::new().unwrap();
        let pool = aegis_common::db::init_database(&temp_dir.path().join("feedback.db"))
            .await
            .unwrap();
        (temp_dir, FeedbackStore::new(pool))
    }

    async fn insert_fallback(store: &FeedbackStore, text: &str, urgent: bool) -> FeedbackRecord {
        store
            .insert_if_absent(NewFeedback {
                raw_content: text.to_string(),
                sanitized_content: text.to_string(),
                fingerprint: fingerprint(text),
                classification: Classification {
                    sentiment: Sentiment::Neutral,
                    topics: [Topic::General].into_iter().collect(),
                    urgent,
                },
                source: ClassificationSource::Fallback,
                provider: "heuristic".to_string(),
                needs_review: false,
            })
            .await
            .unwrap()
            .into_record()
    }

    fn reconciler(store: &FeedbackStore, client: Arc<MockCompletionClient>) -> Reconciler {
        Reconciler::new(store.clone(), client, 10, 2, Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_sweep_upgrades_fallback_records() {
        let (_dir, store) = setup().await;
        let record = insert_fallback(&store, "I was billed twice this month", false).await;

        let client = Arc::new(MockCompletionClient::new(
            Duration::from_millis(5),
            MockBehavior::Respond(r#"{"sentiment": "NEGATIVE", "topics": ["Billing"], "urgent": false}"#.into()),
        ));
        let report = reconciler(&store, client).run_sweep().await.unwrap();
        assert_eq!(report.candidates, 1);
        assert_eq!(report.upgraded, 1);

        let upgraded = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(upgraded.source, ClassificationSource::Ai);
        assert_eq!(upgraded.sentiment, Sentiment::Negative);
        assert_eq!(upgraded.provider, "mock-llm");
        assert_eq!(upgraded.department.as_str(), "Customer Success - Finance");
        assert!(!upgraded.needs_review);
        assert!(upgraded.updated_at > record.updated_at);
    }

    #[tokio::test]
    async fn test_second_sweep_is_noop() {
        let (_dir, store) = setup().await;
        insert_fallback(&store, "Nice colours", false).await;

        let client = Arc::new(MockCompletionClient::heuristic(Duration::from_millis(5)));
        let reconciler = reconciler(&store, client.clone());
        assert_eq!(reconciler.run_sweep().await.unwrap().upgraded, 1);

        let report = reconciler.run_sweep().await.unwrap();
        assert_eq!(report, SweepReport::default());
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failures_leave_records_untouched() {
        let (_dir, store) = setup().await;
        let a = insert_fallback(&store, "first pending item", false).await;
        insert_fallback(&store, "second pending item", false).await;

        let client = Arc::new(MockCompletionClient::new(Duration::ZERO, MockBehavior::Fail("503".into())));
        let report = reconciler(&store, client.clone()).run_sweep().await.unwrap();
        assert_eq!(report.failed, 2);
        assert_eq!(store.get(a.id).await.unwrap().unwrap(), a);

        client.set_behavior(MockBehavior::Respond("not json".into()));
        let report = reconciler(&store, client).run_sweep().await.unwrap();
        assert_eq!(report.failed, 2);
        assert_eq!(store.stats().await.unwrap().fallback, 2);
    }

    #[tokio::test]
    async fn test_escalation_flags_review() {
        let (_dir, store) = setup().await;
        let record = insert_fallback(&store, "This charge is a scam", false).await;

        let client = Arc::new(MockCompletionClient::new(
            Duration::ZERO,
            MockBehavior::Respond(r#"{"sentiment": "NEGATIVE", "topics": ["Billing"], "urgent": true}"#.into()),
        ));
        reconciler(&store, client).run_sweep().await.unwrap();

        let upgraded = store.get(record.id).await.unwrap().unwrap();
        assert!(upgraded.urgent);
        assert!(upgraded.needs_review);
        assert_eq!(store.review_queue().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_forced_sweep_through_worker() {
        let (_dir, store) = setup().await;
        insert_fallback(&store, "please reconcile me", false).await;

        let client = Arc::new(MockCompletionClient::heuristic(Duration::from_millis(5)));
        let cancel = CancellationToken::new();
        let (handle, task) = spawn_reconciler(reconciler(&store, client), Duration::from_secs(3600), cancel.clone());

        let report = handle.force_sweep().await.unwrap();
        assert_eq!(report.upgraded, 1);

        cancel.cancel();
        task.await.unwrap();
        assert!(matches!(handle.force_sweep().await, Err(ReconcileError::WorkerStopped)));
    }
}
