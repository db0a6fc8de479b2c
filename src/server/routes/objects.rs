//! `/crm/v3/objects` - object CRUD, batches, search and merge

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
};
use serde::Deserialize;

use crate::model::{
    BatchObjectInput, BatchReadInput, CrmObject, ObjectId, ObjectInput, Page, Properties,
    SearchResults, deserialize_properties,
};
use crate::server::routes::{BatchInputs, split_list};
use crate::server::{ApiResult, AppState, batch_response, with_store};
use crate::storage::objects::{DEFAULT_ID_PROPERTY, ReadOptions};
use crate::storage::{ListOptions, SearchRequest};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/crm/v3/objects/{object_type}", get(list_objects).post(create_object))
        .route("/crm/v3/objects/{object_type}/search", post(search_objects))
        .route("/crm/v3/objects/{object_type}/merge", post(merge_objects))
        .route("/crm/v3/objects/{object_type}/batch/create", post(batch_create))
        .route("/crm/v3/objects/{object_type}/batch/read", post(batch_read))
        .route("/crm/v3/objects/{object_type}/batch/update", post(batch_update))
        .route("/crm/v3/objects/{object_type}/batch/upsert", post(batch_upsert))
        .route("/crm/v3/objects/{object_type}/batch/archive", post(batch_archive))
        .route(
            "/crm/v3/objects/{object_type}/{object_id}",
            get(get_object).patch(update_object).delete(archive_object),
        )
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectParams {
    pub limit: Option<usize>,
    pub after: Option<String>,
    pub properties: Option<String>,
    pub properties_with_history: Option<String>,
    #[serde(default)]
    pub archived: bool,
    pub id_property: Option<String>,
}

impl ObjectParams {
    fn read_options(&self) -> ReadOptions {
        ReadOptions {
            properties: split_list(self.properties.as_deref()),
            properties_with_history: split_list(self.properties_with_history.as_deref()),
        }
    }

    /// The lookup property when it is not the object id
    fn lookup_property(&self) -> Option<String> {
        self.id_property
            .clone()
            .filter(|p| !p.is_empty() && p != DEFAULT_ID_PROPERTY)
    }
}

#[derive(Debug, Deserialize)]
pub struct PropertiesBody {
    #[serde(default, deserialize_with = "deserialize_properties")]
    pub properties: Properties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeInput {
    pub primary_object_id: String,
    pub object_id_to_merge: String,
}

async fn list_objects(
    State(state): State<AppState>,
    Path(object_type): Path<String>,
    Query(params): Query<ObjectParams>,
) -> ApiResult<Json<Page<CrmObject>>> {
    let options = ListOptions {
        limit: params.limit.unwrap_or(0),
        after: params.after.clone(),
        archived: params.archived,
        properties: split_list(params.properties.as_deref()),
        properties_with_history: split_list(params.properties_with_history.as_deref()),
    };
    let page = with_store(&state, move |s| s.objects().list(&object_type, &options)).await?;
    Ok(Json(page))
}

async fn create_object(
    State(state): State<AppState>,
    Path(object_type): Path<String>,
    Json(input): Json<ObjectInput>,
) -> ApiResult<(StatusCode, Json<CrmObject>)> {
    let object = with_store(&state, move |s| s.objects().create_with(&object_type, input)).await?;
    Ok((StatusCode::CREATED, Json(object)))
}

async fn get_object(
    State(state): State<AppState>,
    Path((object_type, object_id)): Path<(String, String)>,
    Query(params): Query<ObjectParams>,
) -> ApiResult<Json<CrmObject>> {
    let options = params.read_options();
    let lookup = params.lookup_property();
    let object = with_store(&state, move |s| match lookup {
        Some(property) => s.objects().get_by_property(&object_type, &property, &object_id, &options),
        None => s.objects().get(&object_type, &object_id, &options),
    })
    .await?;
    Ok(Json(object))
}

async fn update_object(
    State(state): State<AppState>,
    Path((object_type, object_id)): Path<(String, String)>,
    Query(params): Query<ObjectParams>,
    Json(body): Json<PropertiesBody>,
) -> ApiResult<Json<CrmObject>> {
    let lookup = params.lookup_property();
    let object = with_store(&state, move |s| {
        let objects = s.objects();
        let id = match lookup {
            Some(property) => {
                objects
                    .get_by_property(&object_type, &property, &object_id, &ReadOptions::default())?
                    .id
            }
            None => object_id,
        };
        objects.update(&object_type, &id, body.properties)
    })
    .await?;
    Ok(Json(object))
}

async fn archive_object(
    State(state): State<AppState>,
    Path((object_type, object_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    with_store(&state, move |s| s.objects().archive(&object_type, &object_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn search_objects(
    State(state): State<AppState>,
    Path(object_type): Path<String>,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Json<SearchResults>> {
    let results = with_store(&state, move |s| s.search().search(&object_type, &request)).await?;
    Ok(Json(results))
}

async fn merge_objects(
    State(state): State<AppState>,
    Path(object_type): Path<String>,
    Json(input): Json<MergeInput>,
) -> ApiResult<Json<CrmObject>> {
    let object = with_store(&state, move |s| {
        s.objects()
            .merge(&object_type, &input.primary_object_id, &input.object_id_to_merge)
    })
    .await?;
    Ok(Json(object))
}

// ========== Batch Operations ==========

async fn batch_create(
    State(state): State<AppState>,
    Path(object_type): Path<String>,
    Json(body): Json<BatchInputs<ObjectInput>>,
) -> ApiResult<Response> {
    let batch = with_store(&state, move |s| s.objects().batch_create(&object_type, body.inputs)).await?;
    Ok(batch_response(StatusCode::CREATED, batch))
}

async fn batch_read(
    State(state): State<AppState>,
    Path(object_type): Path<String>,
    Json(input): Json<BatchReadInput>,
) -> ApiResult<Response> {
    let batch = with_store(&state, move |s| s.objects().batch_read(&object_type, &input)).await?;
    Ok(batch_response(StatusCode::OK, batch))
}

async fn batch_update(
    State(state): State<AppState>,
    Path(object_type): Path<String>,
    Json(body): Json<BatchInputs<BatchObjectInput>>,
) -> ApiResult<Response> {
    let batch = with_store(&state, move |s| s.objects().batch_update(&object_type, body.inputs)).await?;
    Ok(batch_response(StatusCode::OK, batch))
}

async fn batch_upsert(
    State(state): State<AppState>,
    Path(object_type): Path<String>,
    Json(body): Json<BatchInputs<BatchObjectInput>>,
) -> ApiResult<Response> {
    let batch = with_store(&state, move |s| s.objects().batch_upsert(&object_type, body.inputs)).await?;
    Ok(batch_response(StatusCode::OK, batch))
}

async fn batch_archive(
    State(state): State<AppState>,
    Path(object_type): Path<String>,
    Json(body): Json<BatchInputs<ObjectId>>,
) -> ApiResult<StatusCode> {
    let ids: Vec<String> = body.inputs.into_iter().map(|input| input.id).collect();
    with_store(&state, move |s| s.objects().batch_archive(&object_type, &ids)).await?;
    Ok(StatusCode::NO_CONTENT)
}
