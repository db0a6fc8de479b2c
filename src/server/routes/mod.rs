//! Route modules, one per API family. Each exposes `routes()`.

use serde::Deserialize;

pub mod associations;
pub mod health;
pub mod lists;
pub mod objects;
pub mod owners;
pub mod pipelines;
pub mod properties;
pub mod schemas;

/// `{"inputs": [...]}` wrapper used by every batch endpoint
#[derive(Debug, Deserialize)]
pub struct BatchInputs<T> {
    pub inputs: Vec<T>,
}

/// `{"results": [...]}` wrapper for unpaged listings
#[derive(Debug, serde::Serialize)]
pub struct Results<T> {
    pub results: Vec<T>,
}

/// Split a comma-separated query parameter, dropping empty entries
pub(crate) fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::server::{AppState, create_router};
    use crate::storage::Store;

    pub fn app() -> Router {
        create_router(AppState::new(Store::open_in_memory().unwrap()))
    }

    pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    /// Create an object and return its id
    pub async fn create(app: &Router, object_type: &str, properties: Value) -> String {
        let (status, body) = send(
            app,
            "POST",
            &format!("/crm/v3/objects/{}", object_type),
            Some(serde_json::json!({ "properties": properties })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["id"].as_str().unwrap().to_string()
    }
}
