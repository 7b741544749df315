//! Race arbiter
//!
//! Runs the heuristic classifier and the AI completion client concurrently
//! under a hard deadline and picks the winner:
//!
//! ```text
//! INIT -> RACING -> WON_AI | WON_FALLBACK -> COMMITTED
//! ```
//!
//! The AI wins only if a schema-valid answer lands strictly before the
//! deadline instant. Timeouts, call errors and schema failures all resolve to
//! the heuristic result, which is computed on every race. The loser is never
//! awaited: a late AI task is aborted and its output discarded. There are no
//! retries here; the reconciliation worker owns retry policy.
//!
//! `COMMITTED` is reached by the caller once the outcome is persisted.

use crate::models::{Classification, ClassificationSource};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::ai_client::{AiError, CompletionClient};
use super::heuristic::{self, HEURISTIC_PROVIDER};
use super::validation::{validate_completion, SchemaError};

/// Why the heuristic result was used
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    /// No AI answer strictly before the deadline
    Deadline,
    /// The AI call failed
    AiError(String),
    /// The AI answered in time with output that failed validation
    InvalidSchema(SchemaError),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::Deadline => f.write_str("deadline elapsed"),
            FallbackReason::AiError(e) => write!(f, "AI call failed: {}", e),
            FallbackReason::InvalidSchema(e) => write!(f, "AI output rejected: {}", e),
        }
    }
}

/// Winning side of a race
#[derive(Debug, Clone, PartialEq)]
pub enum Winner {
    Ai,
    Fallback(FallbackReason),
}

/// Result of one race, ready to be committed
#[derive(Debug, Clone)]
pub struct RaceOutcome {
    pub winner: Winner,
    pub classification: Classification,
    pub provider: String,
    /// AI urgency flag contradicted the urgency rule
    pub needs_review: bool,
    pub elapsed: Duration,
}

impl RaceOutcome {
    pub fn source(&self) -> ClassificationSource {
        match self.winner {
            Winner::Ai => ClassificationSource::Ai,
            Winner::Fallback(_) => ClassificationSource::Fallback,
        }
    }
}

/// Deadline-bound arbiter between the heuristic and AI classifiers
pub struct RaceArbiter {
    ai: Arc<dyn CompletionClient>,
    deadline: Duration,
}

impl RaceArbiter {
    pub fn new(ai: Arc<dyn CompletionClient>, deadline: Duration) -> Self {
        Self { ai, deadline }
    }

    /// Race both classifiers on already-sanitized text
    ///
    /// Never fails: every AI-side problem resolves to the fallback result.
    pub async fn race(&self, sanitized: &str) -> RaceOutcome {
        let started = Instant::now();
        let deadline = started + self.deadline;
        debug!(state = "INIT", deadline_ms = self.deadline.as_millis() as u64, "Race starting");

        let ai = Arc::clone(&self.ai);
        let text = sanitized.to_string();
        let budget = self.deadline;
        let mut ai_task = tokio::spawn(async move { ai.complete(&text, budget).await });
        debug!(state = "RACING", "AI task launched");

        // Always computed: the guaranteed answer if the AI loses
        let fallback = heuristic::classify(sanitized);

        let ai_result = match tokio::time::timeout_at(deadline, &mut ai_task).await {
            Ok(joined) => joined.unwrap_or_else(|e| Err(AiError::Network(format!("AI task failed: {}", e)))),
            Err(_) => {
                ai_task.abort();
                Err(AiError::Timeout(self.deadline))
            }
        };

        // A result landing on or after the deadline instant loses
        let outcome = match ai_result {
            Ok(_) if Instant::now() >= deadline => self.fallback(started, fallback, FallbackReason::Deadline),
            Ok(body) => match validate_completion(&body) {
                Ok(verdict) => {
                    let (classification, disagreement) = verdict.into_classification(sanitized);
                    RaceOutcome {
                        winner: Winner::Ai,
                        classification,
                        provider: self.ai.provider().to_string(),
                        needs_review: disagreement,
                        elapsed: started.elapsed(),
                    }
                }
                Err(e) => self.fallback(started, fallback, FallbackReason::InvalidSchema(e)),
            },
            Err(AiError::Timeout(_)) => self.fallback(started, fallback, FallbackReason::Deadline),
            Err(e) => self.fallback(started, fallback, FallbackReason::AiError(e.to_string())),
        };

        match &outcome.winner {
            Winner::Ai => debug!(
                state = "WON_AI",
                provider = %outcome.provider,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                "Race decided"
            ),
            Winner::Fallback(reason) => debug!(
                state = "WON_FALLBACK",
                reason = %reason,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                "Race decided"
            ),
        }

        outcome
    }

    fn fallback(&self, started: Instant, classification: Classification, reason: FallbackReason) -> RaceOutcome {
        RaceOutcome {
            winner: Winner::Fallback(reason),
            classification,
            provider: HEURISTIC_PROVIDER.to_string(),
            needs_review: false,
            elapsed: started.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Sentiment, Topic};
    use crate::services::ai_client::{DisabledClient, MockBehavior, MockCompletionClient};

    const DEADLINE: Duration = Duration::from_millis(500);

    fn arbiter(client: Arc<MockCompletionClient>) -> RaceArbiter {
        RaceArbiter::new(client, DEADLINE)
    }

    #[tokio::test]
    async fn test_disabled_ai_falls_back_quickly() {
        let arbiter = RaceArbiter::new(Arc::new(DisabledClient), DEADLINE);
        let outcome = arbiter.race("Great service!").await;

        assert_eq!(outcome.source(), ClassificationSource::Fallback);
        assert_eq!(outcome.classification.sentiment, Sentiment::Positive);
        assert_eq!(outcome.provider, HEURISTIC_PROVIDER);
        assert!(outcome.elapsed < DEADLINE);
    }

    #[tokio::test]
    async fn test_ai_wins_within_deadline() {
        let body = r#"{"sentiment": "NEGATIVE", "topics": ["Billing"], "urgent": true}"#;
        let client = Arc::new(MockCompletionClient::new(
            Duration::from_millis(300),
            MockBehavior::Respond(body.to_string()),
        ));
        let outcome = arbiter(client.clone()).race("I was charged twice, this is fraud").await;

        assert_eq!(outcome.winner, Winner::Ai);
        assert_eq!(outcome.classification.sentiment, Sentiment::Negative);
        assert_eq!(outcome.classification.topics, [Topic::Billing].into_iter().collect());
        assert!(outcome.classification.urgent);
        assert!(!outcome.needs_review);
        assert_eq!(outcome.provider, "mock-llm");
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_slow_ai_loses_to_deadline() {
        let client = Arc::new(MockCompletionClient::heuristic(Duration::from_millis(700)));
        let started = std::time::Instant::now();
        let outcome = arbiter(client).race("The app crashes on login").await;

        assert_eq!(outcome.winner, Winner::Fallback(FallbackReason::Deadline));
        assert!(started.elapsed() < DEADLINE + Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_answer_on_deadline_instant_loses() {
        let client = Arc::new(MockCompletionClient::heuristic(DEADLINE));
        let outcome = arbiter(client).race("The app crashes on login").await;

        assert_eq!(outcome.winner, Winner::Fallback(FallbackReason::Deadline));
        assert_eq!(outcome.provider, HEURISTIC_PROVIDER);
    }

    #[tokio::test(start_paused = true)]
    async fn test_answer_just_before_deadline_wins() {
        let client = Arc::new(MockCompletionClient::heuristic(DEADLINE - Duration::from_millis(1)));
        let outcome = arbiter(client).race("The app crashes on login").await;

        assert_eq!(outcome.winner, Winner::Ai);
        assert_eq!(outcome.provider, "mock-llm");
        assert!(outcome.elapsed < DEADLINE);
    }

    #[tokio::test]
    async fn test_invalid_schema_falls_back_even_when_fast() {
        let client = Arc::new(MockCompletionClient::new(
            Duration::from_millis(10),
            MockBehavior::Respond(r#"{"sentiment": "NEGATIVE", "topics": "Billing"}"#.into()),
        ));
        let outcome = arbiter(client).race("Refund my invoice").await;

        assert!(matches!(
            outcome.winner,
            Winner::Fallback(FallbackReason::InvalidSchema(_))
        ));
        assert_eq!(outcome.provider, HEURISTIC_PROVIDER);
    }

    #[tokio::test]
    async fn test_ai_error_falls_back() {
        let client = Arc::new(MockCompletionClient::new(
            Duration::from_millis(5),
            MockBehavior::Fail("connection refused".into()),
        ));
        let outcome = arbiter(client).race("Checkout button is broken").await;

        assert!(matches!(outcome.winner, Winner::Fallback(FallbackReason::AiError(_))));
    }

    #[tokio::test]
    async fn test_fallback_urgency_matches_rule() {
        let outcome = RaceArbiter::new(Arc::new(DisabledClient), DEADLINE)
            .race("I will file a lawsuit")
            .await;
        assert!(outcome.classification.urgent);
    }

    #[tokio::test]
    async fn test_ai_flag_disagreement_marks_review() {
        let client = Arc::new(MockCompletionClient::new(
            Duration::from_millis(5),
            MockBehavior::Respond(r#"{"sentiment": "NEUTRAL", "topics": ["UX"], "urgent": true}"#.into()),
        ));
        let outcome = arbiter(client).race("The menu font is small").await;

        assert_eq!(outcome.winner, Winner::Ai);
        assert!(!outcome.classification.urgent);
        assert!(outcome.needs_review);
    }
}
