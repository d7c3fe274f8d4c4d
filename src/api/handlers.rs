use crate::api::AppState;
use crate::error::Result;
use crate::ml::{ModelType, TrainingSummary, VOTER_PRECEDENCE};
use crate::models::Observation;
use crate::triage::TriageReport;
use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        model_run_id: state.context.artifact().run_id(),
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub model_run_id: Uuid,
}

/// Triage one observation
pub async fn triage(
    State(state): State<AppState>,
    Json(observation): Json<Observation>,
) -> Result<Json<TriageReport>> {
    observation.validate()?;

    let report = state.context.triage(&observation).await?;
    Ok(Json(report))
}

/// Summary of the loaded artifact
pub async fn model_info(State(state): State<AppState>) -> Result<Json<ModelInfoResponse>> {
    let artifact = state.context.artifact();
    let info = artifact.info();

    Ok(Json(ModelInfoResponse {
        run_id: info.run_id,
        format_version: info.format_version,
        created_at: info.created_at,
        feature_names: artifact.feature_names().to_vec(),
        voters: VOTER_PRECEDENCE.to_vec(),
        assessor_timeout_secs: state.context.assessor_timeout().as_secs_f64(),
        training: info.summary.clone(),
    }))
}

#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    pub run_id: Uuid,
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub feature_names: Vec<String>,

    /// Voters in tie-break precedence order
    pub voters: Vec<ModelType>,
    pub assessor_timeout_secs: f64,
    pub training: TrainingSummary,
}

/// Prometheus metrics endpoint
pub async fn metrics() -> (StatusCode, String) {
    let metrics = crate::metrics::gather_metrics();
    (StatusCode::OK, metrics)
}
