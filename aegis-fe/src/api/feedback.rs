//! Feedback endpoints
//!
//! - `POST /feedback` submit text for classification
//! - `GET /feedback` page through records, newest first
//! - `GET /feedback/:id` single record
//! - `PATCH /feedback/:id/resolve` close a ticket

use crate::db::ResolveOutcome;
use crate::models::FeedbackRecord;
use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Set to `Duplicate` when the submission did not create the record
pub const STATUS_HEADER: HeaderName = HeaderName::from_static("x-status");

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub raw_content: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct FeedbackPage {
    pub items: Vec<FeedbackRecord>,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolveRequest {
    pub note: Option<String>,
}

/// POST /feedback
///
/// 201 with the new record, or 200 with the already committed record and
/// `X-Status: Duplicate`. 400 when the text is rejected by normalization.
pub async fn submit_feedback(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> ApiResult<Response> {
    let outcome = state.ingest.submit(&request.raw_content).await.map_err(ApiError::from);
    let outcome = state.track(outcome).await?;

    if outcome.duplicate {
        let mut response = (StatusCode::OK, Json(outcome.record)).into_response();
        response
            .headers_mut()
            .insert(STATUS_HEADER, HeaderValue::from_static("Duplicate"));
        Ok(response)
    } else {
        Ok((StatusCode::CREATED, Json(outcome.record)).into_response())
    }
}

/// GET /feedback?offset=&limit=
///
/// `limit` defaults to 20 and is capped at 100.
pub async fn list_feedback(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<FeedbackPage>> {
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let items = state.track(state.store.list(offset, limit).await.map_err(ApiError::from)).await?;
    Ok(Json(FeedbackPage { items, offset, limit }))
}

/// GET /feedback/:id
pub async fn get_feedback(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<FeedbackRecord>> {
    let id = parse_id(&id)?;
    state
        .track(state.store.get(id).await.map_err(ApiError::from))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Feedback {}", id)))
}

/// PATCH /feedback/:id/resolve
///
/// Body is optional: `{"note": "..."}`. 409 if already resolved.
pub async fn resolve_feedback(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ResolveRequest>>,
) -> ApiResult<Json<FeedbackRecord>> {
    let id = parse_id(&id)?;
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let note = request.note.as_deref().map(str::trim).filter(|n| !n.is_empty());

    let outcome = state.track(state.store.mark_resolved(id, note).await.map_err(ApiError::from)).await?;
    match outcome {
        ResolveOutcome::Resolved(record) => {
            tracing::info!(%id, "Feedback resolved");
            Ok(Json(record))
        }
        ResolveOutcome::AlreadyResolved => Err(ApiError::Conflict(format!("Feedback {} is already resolved", id))),
        ResolveOutcome::NotFound => Err(ApiError::NotFound(format!("Feedback {}", id))),
    }
}

fn parse_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid feedback id: {}", raw)))
}

pub fn feedback_routes() -> Router<AppState> {
    Router::new()
        .route("/feedback", get(list_feedback).post(submit_feedback))
        .route("/feedback/:id", get(get_feedback))
        .route("/feedback/:id/resolve", patch(resolve_feedback))
}
