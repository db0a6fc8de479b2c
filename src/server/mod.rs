//! HTTP layer: an axum router shaped like the upstream CRM REST API.

use axum::{Json, Router, http::StatusCode, response::{IntoResponse, Response}};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::model::BatchResult;
use crate::storage::{Session, Store};

pub mod error;
pub mod routes;

pub use error::{ApiError, ApiResult};

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub ui_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(store: Store) -> Self {
        Self {
            store: Arc::new(store),
            ui_dir: None,
        }
    }

    pub fn with_ui_dir(mut self, ui_dir: Option<PathBuf>) -> Self {
        self.ui_dir = ui_dir;
        self
    }
}

/// Run `f` against a locked session on the blocking pool
pub(crate) async fn with_store<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Session<'_>) -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || f(&store.session()))
        .await
        .map_err(|e| ApiError::internal(format!("store task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// 207 when any input failed, `ok` otherwise
pub(crate) fn batch_response<T: Serialize>(ok: StatusCode, batch: BatchResult<T>) -> Response {
    let status = if batch.num_errors > 0 { StatusCode::MULTI_STATUS } else { ok };
    (status, Json(batch)).into_response()
}

pub fn create_router(state: AppState) -> Router {
    let router = Router::new()
        .merge(routes::health::routes())
        .merge(routes::objects::routes())
        .merge(routes::associations::routes())
        .merge(routes::properties::routes())
        .merge(routes::schemas::routes())
        .merge(routes::pipelines::routes())
        .merge(routes::owners::routes())
        .merge(routes::lists::routes());

    let router = match state.ui_dir.clone() {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = create_router(state);

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
