use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;

use crate::dto::HealthResponse;
use crate::error::ApiError;
use crate::state::AppState;

/// Build the router: the scrape endpoint at `metrics_path` and `/health`.
pub fn router(state: Arc<AppState>, metrics_path: &str) -> Router {
    Router::new()
        .route(metrics_path, get(metrics))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn metrics(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let body = state.registry.render()?;
    Ok(([(header::CONTENT_TYPE, state.registry.content_type())], body))
}

pub async fn health() -> impl IntoResponse {
    axum::Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}
