//! API route definitions

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, StatusCode},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use super::error::{error_body, ErrorKind};
use super::{handlers, state::AppState};

async fn handle_404() -> Response {
    error_body(
        StatusCode::NOT_FOUND,
        ErrorKind::NotFound,
        "Not found. Visit /api/health to check API status.",
    )
}

async fn handle_405() -> Response {
    error_body(
        StatusCode::METHOD_NOT_ALLOWED,
        ErrorKind::MethodNotAllowed,
        "Method not allowed",
    )
}

/// CORS for the configured origin, or any origin when unset or `*`
fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match origin {
        Some(origin) if !origin.is_empty() && origin != "*" => match origin.parse::<HeaderValue>() {
            Ok(value) => layer.allow_origin(value),
            Err(_) => {
                warn!(origin = %origin, "Invalid CORS origin, allowing any");
                layer.allow_origin(Any)
            }
        },
        _ => layer.allow_origin(Any),
    }
}

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let max_upload_size = state.config.max_upload_size;
    let cors = cors_layer(state.config.cors_origin.as_deref());

    let api_routes = Router::new()
        .route("/upload-dataset", post(handlers::upload_dataset))
        .route("/get-dataset-info", get(handlers::get_dataset_info))
        .route("/get-model-results", get(handlers::get_model_results))
        .route("/train-ensemble", post(handlers::train_ensemble))
        .route("/health", get(handlers::health_check))
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405);

    Router::new()
        .nest("/api", api_routes)
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405)
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_size))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
