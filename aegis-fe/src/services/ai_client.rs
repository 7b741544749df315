//! AI completion clients
//!
//! The engine only needs `complete(text, timeout) -> raw JSON text`; callers
//! validate the returned text against the classification schema before
//! trusting it (see [`super::validation`]).
//!
//! Implementations:
//! - [`OpenAiCompatClient`]: chat-completions over HTTP (Groq, OpenAI), rate limited
//! - [`MockCompletionClient`]: simulated latency with scriptable answers
//! - [`DisabledClient`]: always fails, so every race falls back

use aegis_common::config::{AiProvider, AiSettings};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use super::heuristic;

const USER_AGENT: &str = concat!("aegis-fe/", env!("CARGO_PKG_VERSION"));

/// Latency simulated by the mock backend in mock mode
pub const MOCK_LATENCY: Duration = Duration::from_millis(300);

const SYSTEM_PROMPT: &str = "You are a classification engine. Return VALID JSON ONLY. \
Schema: {\"sentiment\": \"POSITIVE\"|\"NEGATIVE\"|\"NEUTRAL\", \
\"topics\": [one or more of \"Billing\", \"Technical\", \"UX\", \"Security\", \"General\"], \
\"urgent\": boolean}";

/// Completion call failures
#[derive(Debug, Clone, Error)]
pub enum AiError {
    #[error("AI provider not configured")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(String),

    #[error("AI call timed out after {0:?}")]
    Timeout(Duration),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("AI response contained no content")]
    EmptyResponse,
}

/// Asynchronous completion service
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Label stored on records classified by this client
    fn provider(&self) -> &str;

    /// Request a classification for `text`, returning the raw JSON body
    async fn complete(&self, text: &str, timeout: Duration) -> Result<String, AiError>;
}

/// Build the client selected by configuration
pub fn build_client(settings: &AiSettings) -> Result<Arc<dyn CompletionClient>, AiError> {
    let client: Arc<dyn CompletionClient> = match settings.provider {
        AiProvider::Groq | AiProvider::OpenAi => Arc::new(OpenAiCompatClient::new(settings)?),
        AiProvider::Mock => Arc::new(MockCompletionClient::heuristic(MOCK_LATENCY)),
        AiProvider::Disabled => Arc::new(DisabledClient),
    };
    tracing::info!(provider = %client.provider(), "AI completion client ready");
    Ok(client)
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat-completions client (Groq and OpenAI)
pub struct OpenAiCompatClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    provider: &'static str,
    rate_limiter: governor::DefaultDirectRateLimiter,
}

impl OpenAiCompatClient {
    pub fn new(settings: &AiSettings) -> Result<Self, AiError> {
        let api_key = settings.api_key.clone().ok_or(AiError::NotConfigured)?;

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AiError::Network(e.to_string()))?;

        let quota = governor::Quota::per_second(
            NonZeroU32::new(settings.requests_per_second).unwrap_or(NonZeroU32::MIN),
        );

        Ok(Self {
            http_client,
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            api_key,
            model: settings.model.clone(),
            provider: settings.provider.label(),
            rate_limiter: governor::RateLimiter::direct(quota),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    fn provider(&self) -> &str {
        self.provider
    }

    async fn complete(&self, text: &str, timeout: Duration) -> Result<String, AiError> {
        // Respect the provider quota
        self.rate_limiter.until_ready().await;

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": text },
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0,
        });

        tracing::debug!(provider = %self.provider, model = %self.model, "Requesting completion");

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout(timeout)
                } else {
                    AiError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AiError::Api(status.as_u16(), error_text));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AiError::Network(format!("Unreadable completion body: {}", e)))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(AiError::EmptyResponse)
    }
}

/// Client used when no AI backend is configured
pub struct DisabledClient;

#[async_trait]
impl CompletionClient for DisabledClient {
    fn provider(&self) -> &str {
        AiProvider::Disabled.label()
    }

    async fn complete(&self, _text: &str, _timeout: Duration) -> Result<String, AiError> {
        Err(AiError::NotConfigured)
    }
}

/// What the mock backend answers after its latency elapses
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Schema-valid answer derived from the heuristic classifier
    Heuristic,
    /// Return this body verbatim
    Respond(String),
    /// Fail with a network error
    Fail(String),
}

/// Scriptable completion backend
///
/// Serves mock mode at runtime and drives race and reconciliation tests.
/// Latency and behavior can be switched while the engine runs.
pub struct MockCompletionClient {
    latency: Mutex<Duration>,
    behavior: Mutex<MockBehavior>,
    calls: AtomicUsize,
}

impl MockCompletionClient {
    pub fn new(latency: Duration, behavior: MockBehavior) -> Self {
        Self {
            latency: Mutex::new(latency),
            behavior: Mutex::new(behavior),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn heuristic(latency: Duration) -> Self {
        Self::new(latency, MockBehavior::Heuristic)
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        if let Ok(mut current) = self.behavior.lock() {
            *current = behavior;
        }
    }

    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut current) = self.latency.lock() {
            *current = latency;
        }
    }

    /// Number of `complete` calls received so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> (Duration, MockBehavior) {
        let latency = self.latency.lock().map(|l| *l).unwrap_or_default();
        let behavior = self
            .behavior
            .lock()
            .map(|b| b.clone())
            .unwrap_or_else(|_| MockBehavior::Fail("mock state poisoned".to_string()));
        (latency, behavior)
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    fn provider(&self) -> &str {
        AiProvider::Mock.label()
    }

    async fn complete(&self, text: &str, timeout: Duration) -> Result<String, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (latency, behavior) = self.snapshot();

        if latency > timeout {
            tokio::time::sleep(timeout).await;
            return Err(AiError::Timeout(timeout));
        }
        tokio::time::sleep(latency).await;

        match behavior {
            MockBehavior::Heuristic => {
                let classification = heuristic::classify(text);
                Ok(json!({
                    "sentiment": classification.sentiment.as_str(),
                    "topics": classification.topics.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
                    "urgent": classification.urgent,
                })
                .to_string())
            }
            MockBehavior::Respond(body) => Ok(body),
            MockBehavior::Fail(message) => Err(AiError::Network(message)),
        }
    }
}
