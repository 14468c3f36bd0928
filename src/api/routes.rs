use crate::api::{handlers, AppState};
use crate::metrics::track_http;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Build the main API router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/health/live", get(handlers::health_check))
        .route("/health/ready", get(handlers::readiness_check))
        // Model
        .route("/v1/model", get(handlers::model_info))
        // Prediction
        .route("/v1/predict", post(handlers::predict))
        .route("/v1/predict/raw", post(handlers::predict_raw))
        // Metrics
        .route("/metrics", get(handlers::metrics))
        .route_layer(middleware::from_fn(track_http))
        // Add state
        .with_state(state)
        // Add middleware
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}
