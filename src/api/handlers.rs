use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::metrics::gather_metrics;
use crate::ml::{ModelInfo, PredictionReport};
use crate::models::{RawFields, SensorReading};
use axum::{
    extract::{FromRequest, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// JSON body extractor whose rejections render as [`AppError`]
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        model: Some(state.service.adapter().metadata().name.clone()),
    }))
}

/// Readiness endpoint; the server only starts once a model is loaded
pub async fn readiness_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "ready".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        model: Some(state.service.adapter().metadata().name.clone()),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Describe the loaded model
pub async fn model_info(State(state): State<AppState>) -> Result<Json<ModelInfo>> {
    Ok(Json(state.service.model_info()))
}

/// Predict from a typed sensor reading
pub async fn predict(
    State(state): State<AppState>,
    ApiJson(reading): ApiJson<SensorReading>,
) -> Result<Json<PredictionReport>> {
    reading.validate()?;

    let report = state.service.predict_reading(&reading)?;
    Ok(Json(report))
}

/// Predict from arbitrary named fields
pub async fn predict_raw(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<PredictRawRequest>,
) -> Result<Json<PredictionReport>> {
    let report = state.service.predict_fields(&request.fields)?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct PredictRawRequest {
    pub fields: RawFields,
}

/// Prometheus scrape endpoint
pub async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}
