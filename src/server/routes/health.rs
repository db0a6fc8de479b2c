use axum::{Json, Router, extract::State, http::StatusCode, routing::{get, post}};
use serde_json::{Value, json};

use crate::server::{ApiError, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/_hubsim/reset", post(reset))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Wipe every table and re-seed the built-in data
async fn reset(State(state): State<AppState>) -> ApiResult<StatusCode> {
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || store.reset())
        .await
        .map_err(|e| ApiError::internal(format!("reset task failed: {}", e)))??;
    Ok(StatusCode::NO_CONTENT)
}
