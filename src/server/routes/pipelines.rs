//! `/crm/v3/pipelines` - pipelines and their stages

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};

use crate::server::routes::Results;
use crate::server::{ApiResult, AppState, with_store};
use crate::storage::pipelines::{
    Pipeline, PipelineInput, PipelinePatch, PipelineStage, StageInput, StagePatch,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/crm/v3/pipelines/{object_type}", get(list_pipelines).post(create_pipeline))
        .route(
            "/crm/v3/pipelines/{object_type}/{pipeline_id}",
            get(get_pipeline).patch(update_pipeline).delete(archive_pipeline),
        )
        .route(
            "/crm/v3/pipelines/{object_type}/{pipeline_id}/stages",
            get(list_stages).post(create_stage),
        )
        .route(
            "/crm/v3/pipelines/{object_type}/{pipeline_id}/stages/{stage_id}",
            get(get_stage).patch(update_stage).delete(archive_stage),
        )
}

async fn list_pipelines(
    State(state): State<AppState>,
    Path(object_type): Path<String>,
) -> ApiResult<Json<Results<Pipeline>>> {
    let results = with_store(&state, move |s| s.pipelines().list(&object_type)).await?;
    Ok(Json(Results { results }))
}

async fn create_pipeline(
    State(state): State<AppState>,
    Path(object_type): Path<String>,
    Json(input): Json<PipelineInput>,
) -> ApiResult<(StatusCode, Json<Pipeline>)> {
    let pipeline = with_store(&state, move |s| s.pipelines().create(&object_type, input)).await?;
    Ok((StatusCode::CREATED, Json(pipeline)))
}

async fn get_pipeline(
    State(state): State<AppState>,
    Path((object_type, pipeline_id)): Path<(String, String)>,
) -> ApiResult<Json<Pipeline>> {
    let pipeline = with_store(&state, move |s| s.pipelines().get(&object_type, &pipeline_id)).await?;
    Ok(Json(pipeline))
}

async fn update_pipeline(
    State(state): State<AppState>,
    Path((object_type, pipeline_id)): Path<(String, String)>,
    Json(patch): Json<PipelinePatch>,
) -> ApiResult<Json<Pipeline>> {
    let pipeline = with_store(&state, move |s| {
        s.pipelines().update(&object_type, &pipeline_id, patch)
    })
    .await?;
    Ok(Json(pipeline))
}

async fn archive_pipeline(
    State(state): State<AppState>,
    Path((object_type, pipeline_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    with_store(&state, move |s| s.pipelines().archive(&object_type, &pipeline_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ========== Stages ==========

async fn list_stages(
    State(state): State<AppState>,
    Path((object_type, pipeline_id)): Path<(String, String)>,
) -> ApiResult<Json<Results<PipelineStage>>> {
    let results = with_store(&state, move |s| s.pipelines().list_stages(&object_type, &pipeline_id)).await?;
    Ok(Json(Results { results }))
}

async fn create_stage(
    State(state): State<AppState>,
    Path((object_type, pipeline_id)): Path<(String, String)>,
    Json(input): Json<StageInput>,
) -> ApiResult<(StatusCode, Json<PipelineStage>)> {
    let stage = with_store(&state, move |s| {
        s.pipelines().create_stage(&object_type, &pipeline_id, input)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(stage)))
}

async fn get_stage(
    State(state): State<AppState>,
    Path((object_type, pipeline_id, stage_id)): Path<(String, String, String)>,
) -> ApiResult<Json<PipelineStage>> {
    let stage = with_store(&state, move |s| {
        s.pipelines().get_stage(&object_type, &pipeline_id, &stage_id)
    })
    .await?;
    Ok(Json(stage))
}

async fn update_stage(
    State(state): State<AppState>,
    Path((object_type, pipeline_id, stage_id)): Path<(String, String, String)>,
    Json(patch): Json<StagePatch>,
) -> ApiResult<Json<PipelineStage>> {
    let stage = with_store(&state, move |s| {
        s.pipelines()
            .update_stage(&object_type, &pipeline_id, &stage_id, patch)
    })
    .await?;
    Ok(Json(stage))
}

async fn archive_stage(
    State(state): State<AppState>,
    Path((object_type, pipeline_id, stage_id)): Path<(String, String, String)>,
) -> ApiResult<StatusCode> {
    with_store(&state, move |s| {
        s.pipelines().archive_stage(&object_type, &pipeline_id, &stage_id)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::server::routes::testing::{app, send};

    #[tokio::test]
    async fn test_pipeline_with_stages() {
        let app = app();
        let input = json!({
            "label": "Renewals",
            "stages": [{"label": "Open"}, {"label": "Won", "metadata": {"probability": "1.0"}}]
        });
        let (status, body) = send(&app, "POST", "/crm/v3/pipelines/deals", Some(input)).await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        let id = body["id"].as_str().unwrap().to_string();
        assert_eq!(body["stages"].as_array().unwrap().len(), 2);

        let uri = format!("/crm/v3/pipelines/deals/{}/stages", id);
        let (status, body) = send(&app, "POST", &uri, Some(json!({"label": "Lost"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["label"], "Lost");

        let (_, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(body["results"].as_array().unwrap().len(), 3);

        let (status, _) = send(&app, "DELETE", &format!("/crm/v3/pipelines/deals/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_unknown_pipeline_is_404() {
        let app = app();
        let (status, _) = send(&app, "GET", "/crm/v3/pipelines/deals/987654", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
