//! `/crm/v3/schemas` - custom object types

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};

use crate::model::AssociationType;
use crate::server::routes::Results;
use crate::server::{ApiResult, AppState, with_store};
use crate::storage::types::{ObjectSchema, SchemaAssociationInput, SchemaInput, SchemaPatch};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/crm/v3/schemas", get(list_schemas).post(create_schema))
        .route(
            "/crm/v3/schemas/{object_type}",
            get(get_schema).patch(update_schema).delete(delete_schema),
        )
        .route("/crm/v3/schemas/{object_type}/associations", post(create_association))
}

async fn list_schemas(State(state): State<AppState>) -> ApiResult<Json<Results<ObjectSchema>>> {
    let results = with_store(&state, |s| s.schemas().list()).await?;
    Ok(Json(Results { results }))
}

async fn create_schema(
    State(state): State<AppState>,
    Json(input): Json<SchemaInput>,
) -> ApiResult<(StatusCode, Json<ObjectSchema>)> {
    let schema = with_store(&state, move |s| s.schemas().create(input)).await?;
    tracing::info!(object_type = %schema.object_type_id, "registered custom object type");
    Ok((StatusCode::CREATED, Json(schema)))
}

async fn get_schema(
    State(state): State<AppState>,
    Path(object_type): Path<String>,
) -> ApiResult<Json<ObjectSchema>> {
    let schema = with_store(&state, move |s| s.schemas().get(&object_type)).await?;
    Ok(Json(schema))
}

async fn update_schema(
    State(state): State<AppState>,
    Path(object_type): Path<String>,
    Json(patch): Json<SchemaPatch>,
) -> ApiResult<Json<ObjectSchema>> {
    let schema = with_store(&state, move |s| s.schemas().update(&object_type, patch)).await?;
    Ok(Json(schema))
}

async fn delete_schema(
    State(state): State<AppState>,
    Path(object_type): Path<String>,
) -> ApiResult<StatusCode> {
    with_store(&state, move |s| s.schemas().delete(&object_type)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_association(
    State(state): State<AppState>,
    Path(object_type): Path<String>,
    Json(input): Json<SchemaAssociationInput>,
) -> ApiResult<(StatusCode, Json<AssociationType>)> {
    let created = with_store(&state, move |s| s.schemas().create_association(&object_type, input)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}
