//! `/crm/v3/properties` - property definitions and groups

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
};
use serde::Deserialize;

use crate::server::routes::{BatchInputs, Results};
use crate::server::{ApiResult, AppState, batch_response, with_store};
use crate::storage::properties::{
    PropertyDefinition, PropertyGroup, PropertyGroupInput, PropertyGroupPatch, PropertyInput,
    PropertyPatch,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/crm/v3/properties/{object_type}", get(list_properties).post(create_property))
        .route("/crm/v3/properties/{object_type}/batch/create", post(batch_create))
        .route("/crm/v3/properties/{object_type}/batch/read", post(batch_read))
        .route("/crm/v3/properties/{object_type}/batch/archive", post(batch_archive))
        .route("/crm/v3/properties/{object_type}/groups", get(list_groups).post(create_group))
        .route(
            "/crm/v3/properties/{object_type}/groups/{group_name}",
            get(get_group).patch(update_group).delete(archive_group),
        )
        .route(
            "/crm/v3/properties/{object_type}/{property_name}",
            get(get_property).patch(update_property).delete(archive_property),
        )
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Deserialize)]
pub struct PropertyName {
    pub name: String,
}

async fn list_properties(
    State(state): State<AppState>,
    Path(object_type): Path<String>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Results<PropertyDefinition>>> {
    let results = with_store(&state, move |s| s.properties().list(&object_type, params.archived)).await?;
    Ok(Json(Results { results }))
}

async fn create_property(
    State(state): State<AppState>,
    Path(object_type): Path<String>,
    Json(input): Json<PropertyInput>,
) -> ApiResult<(StatusCode, Json<PropertyDefinition>)> {
    let created = with_store(&state, move |s| s.properties().create(&object_type, input)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_property(
    State(state): State<AppState>,
    Path((object_type, name)): Path<(String, String)>,
) -> ApiResult<Json<PropertyDefinition>> {
    let property = with_store(&state, move |s| s.properties().get(&object_type, &name)).await?;
    Ok(Json(property))
}

async fn update_property(
    State(state): State<AppState>,
    Path((object_type, name)): Path<(String, String)>,
    Json(patch): Json<PropertyPatch>,
) -> ApiResult<Json<PropertyDefinition>> {
    let property = with_store(&state, move |s| s.properties().update(&object_type, &name, patch)).await?;
    Ok(Json(property))
}

async fn archive_property(
    State(state): State<AppState>,
    Path((object_type, name)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    with_store(&state, move |s| s.properties().archive(&object_type, &name)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn batch_create(
    State(state): State<AppState>,
    Path(object_type): Path<String>,
    Json(body): Json<BatchInputs<PropertyInput>>,
) -> ApiResult<Response> {
    let batch = with_store(&state, move |s| s.properties().batch_create(&object_type, body.inputs)).await?;
    Ok(batch_response(StatusCode::CREATED, batch))
}

async fn batch_read(
    State(state): State<AppState>,
    Path(object_type): Path<String>,
    Json(body): Json<BatchInputs<PropertyName>>,
) -> ApiResult<Response> {
    let names: Vec<String> = body.inputs.into_iter().map(|input| input.name).collect();
    let batch = with_store(&state, move |s| s.properties().batch_read(&object_type, &names)).await?;
    Ok(batch_response(StatusCode::OK, batch))
}

async fn batch_archive(
    State(state): State<AppState>,
    Path(object_type): Path<String>,
    Json(body): Json<BatchInputs<PropertyName>>,
) -> ApiResult<StatusCode> {
    let names: Vec<String> = body.inputs.into_iter().map(|input| input.name).collect();
    with_store(&state, move |s| s.properties().batch_archive(&object_type, &names)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ========== Groups ==========

async fn list_groups(
    State(state): State<AppState>,
    Path(object_type): Path<String>,
) -> ApiResult<Json<Results<PropertyGroup>>> {
    let results = with_store(&state, move |s| s.properties().list_groups(&object_type)).await?;
    Ok(Json(Results { results }))
}

async fn create_group(
    State(state): State<AppState>,
    Path(object_type): Path<String>,
    Json(input): Json<PropertyGroupInput>,
) -> ApiResult<(StatusCode, Json<PropertyGroup>)> {
    let group = with_store(&state, move |s| s.properties().create_group(&object_type, input)).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

async fn get_group(
    State(state): State<AppState>,
    Path((object_type, name)): Path<(String, String)>,
) -> ApiResult<Json<PropertyGroup>> {
    let group = with_store(&state, move |s| s.properties().get_group(&object_type, &name)).await?;
    Ok(Json(group))
}

async fn update_group(
    State(state): State<AppState>,
    Path((object_type, name)): Path<(String, String)>,
    Json(patch): Json<PropertyGroupPatch>,
) -> ApiResult<Json<PropertyGroup>> {
    let group = with_store(&state, move |s| s.properties().update_group(&object_type, &name, patch)).await?;
    Ok(Json(group))
}

async fn archive_group(
    State(state): State<AppState>,
    Path((object_type, name)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    with_store(&state, move |s| s.properties().archive_group(&object_type, &name)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::server::routes::testing::send;

    #[tokio::test]
    async fn test_create_duplicate_property_conflicts() {
        let app = crate::server::routes::testing::app();
        let input = json!({
            "name": "favorite_color",
            "label": "Favorite color",
            "type": "string",
            "fieldType": "text"
        });
        let (status, body) = send(&app, "POST", "/crm/v3/properties/contacts", Some(input.clone())).await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert_eq!(body["name"], "favorite_color");

        let (status, body) = send(&app, "POST", "/crm/v3/properties/contacts", Some(input)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["category"], "CONFLICT");

        let (status, body) = send(&app, "GET", "/crm/v3/properties/contacts/favorite_color", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["fieldType"], "text");
    }

    #[tokio::test]
    async fn test_groups_route_is_not_a_property() {
        let app = crate::server::routes::testing::app();
        let (status, body) = send(&app, "GET", "/crm/v3/properties/contacts/groups", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["results"].is_array());
    }
}
