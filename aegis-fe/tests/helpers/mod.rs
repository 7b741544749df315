//! Shared setup for aegis-fe integration tests

#![allow(dead_code)]

use aegis_common::EngineParams;
use aegis_fe::services::{CompletionClient, MockBehavior, MockCompletionClient, WebhookAlerter};
use aegis_fe::AppState;
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEADLINE: Duration = Duration::from_millis(500);

/// A running engine on a temporary database
pub struct TestEngine {
    pub state: AppState,
    pub cancel: CancellationToken,
    pub worker: JoinHandle<()>,
    _dir: TempDir,
}

impl TestEngine {
    pub async fn start(client: Arc<dyn CompletionClient>) -> Self {
        let dir = TempDir::new().unwrap();
        let pool = aegis_common::db::init_database(&dir.path().join("feedback.db"))
            .await
            .unwrap();

        let params = EngineParams {
            race_deadline: DEADLINE,
            // Long enough that only forced sweeps run during a test
            reconcile_interval: Duration::from_secs(3600),
            reconcile_timeout: Duration::from_secs(2),
            ..EngineParams::default()
        };

        let cancel = CancellationToken::new();
        let (state, worker) =
            aegis_fe::start_engine(pool, &params, client, WebhookAlerter::disabled(), cancel.clone());

        Self {
            state,
            cancel,
            worker,
            _dir: dir,
        }
    }

    pub fn router(&self) -> axum::Router {
        aegis_fe::build_router(self.state.clone())
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.worker.await.unwrap();
    }
}

pub fn mock_client(latency_ms: u64, behavior: MockBehavior) -> Arc<MockCompletionClient> {
    Arc::new(MockCompletionClient::new(Duration::from_millis(latency_ms), behavior))
}

pub fn respond(body: &str) -> MockBehavior {
    MockBehavior::Respond(body.to_string())
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
