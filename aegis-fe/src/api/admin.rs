//! Admin endpoints
//!
//! - `GET /admin/stats` aggregate counters
//! - `POST /admin/reconcile` force a reconciliation sweep
//! - `GET /admin/reviews` records flagged for human review
//! - `GET /admin/reviews/csv` the same queue as a CSV download

use crate::models::{FeedbackRecord, FeedbackStats};
use crate::services::SweepReport;
use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// GET /admin/stats
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<FeedbackStats>> {
    let stats = state.track(state.store.stats().await.map_err(ApiError::from)).await?;
    Ok(Json(stats))
}

/// POST /admin/reconcile
///
/// Runs one sweep on the reconciliation worker and returns its report.
pub async fn force_reconcile(State(state): State<AppState>) -> ApiResult<Json<SweepReport>> {
    let report = state.track(state.reconcile.force_sweep().await.map_err(ApiError::from)).await?;
    Ok(Json(report))
}

/// GET /admin/reviews
pub async fn review_queue(State(state): State<AppState>) -> ApiResult<Json<Vec<FeedbackRecord>>> {
    let records = state.track(state.store.review_queue().await.map_err(ApiError::from)).await?;
    Ok(Json(records))
}

/// GET /admin/reviews/csv
pub async fn export_reviews_csv(State(state): State<AppState>) -> ApiResult<Response> {
    let records = state.track(state.store.review_queue().await.map_err(ApiError::from)).await?;
    let body = state.track(reviews_csv(&records)).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=review_queue.csv"),
        ],
        body,
    )
        .into_response())
}

fn reviews_csv(records: &[FeedbackRecord]) -> ApiResult<Vec<u8>> {
    let export_error = |e: csv::Error| ApiError::Internal(format!("CSV export failed: {}", e));

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["id", "sentiment", "topics", "urgent", "department", "source", "provider", "raw_content"])
        .map_err(export_error)?;

    for record in records {
        let topics: Vec<&str> = record.topics.iter().map(|t| t.as_str()).collect();
        writer
            .write_record([
                record.id.to_string().as_str(),
                record.sentiment.as_str(),
                topics.join(";").as_str(),
                if record.urgent { "true" } else { "false" },
                record.department.as_str(),
                record.source.as_str(),
                record.provider.as_str(),
                record.raw_content.as_str(),
            ])
            .map_err(export_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| ApiError::Internal(format!("CSV export failed: {}", e)))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/stats", get(get_stats))
        .route("/admin/reconcile", post(force_reconcile))
        .route("/admin/reviews", get(review_queue))
        .route("/admin/reviews/csv", get(export_reviews_csv))
}
