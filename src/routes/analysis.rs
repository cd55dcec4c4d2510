use axum::{
    Json,
    extract::{Query, State},
};
use serde_json::{Value, json};

use crate::AppState;
use crate::error::AppResult;
use crate::pipeline;
use crate::request::{AnalysisQuery, AnalysisRequest};

/// Admits an analysis request. Validation happens before anything else; the
/// caller only learns that processing started, the outcome arrives by mail.
#[tracing::instrument(name = "route analysis", skip_all, fields(dataset.id))]
pub async fn start_analysis(
    State(state): State<AppState>,
    Query(query): Query<AnalysisQuery>,
) -> AppResult<Json<Value>> {
    tracing::info!(?query, "Received analysis request");
    let request = AnalysisRequest::try_from(query)?;
    tracing::Span::current().record("dataset.id", request.dataset_id.as_str());

    // detached; the supervisor owns the outcome
    let _ = pipeline::spawn(state.pipeline.clone(), request);

    Ok(Json(json!({ "processing": "true" })))
}
