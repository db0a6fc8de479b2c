//! `/crm/v4/objects/.../associations` and `/crm/v4/associations` - edges,
//! batches and labels

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::{delete, get, post, put},
};

use crate::model::{
    AssociatedObject, AssociationSpec, AssociationType, BatchResult, LabelsBetweenObjectPair,
    ObjectId, now_timestamp,
};
use crate::server::routes::{BatchInputs, Results};
use crate::server::{ApiResult, AppState, batch_response, with_store};
use crate::storage::associations::{
    ArchiveInput, AssociationPairInput, DefaultAssociation, LabelInput, LabelUpdate,
    LabeledAssociationInput,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/crm/v4/objects/{from_type}/{from_id}/associations/{to_type}",
            get(list_associations),
        )
        .route(
            "/crm/v4/objects/{from_type}/{from_id}/associations/default/{to_type}/{to_id}",
            put(associate_default),
        )
        .route(
            "/crm/v4/objects/{from_type}/{from_id}/associations/{to_type}/{to_id}",
            put(associate_with_labels).delete(remove_associations),
        )
        .route(
            "/crm/v4/associations/{from_type}/{to_type}/batch/associate/default",
            post(batch_associate_default),
        )
        .route("/crm/v4/associations/{from_type}/{to_type}/batch/create", post(batch_create))
        .route("/crm/v4/associations/{from_type}/{to_type}/batch/read", post(batch_read))
        .route("/crm/v4/associations/{from_type}/{to_type}/batch/archive", post(batch_archive))
        .route(
            "/crm/v4/associations/{from_type}/{to_type}/batch/labels/archive",
            post(batch_archive_labels),
        )
        .route(
            "/crm/v4/associations/{from_type}/{to_type}/labels",
            get(list_labels).post(create_label).put(update_label),
        )
        .route(
            "/crm/v4/associations/{from_type}/{to_type}/labels/{type_id}",
            delete(delete_label),
        )
}

// ========== Object Edges ==========

async fn list_associations(
    State(state): State<AppState>,
    Path((from_type, from_id, to_type)): Path<(String, String, String)>,
) -> ApiResult<Json<Results<AssociatedObject>>> {
    let results = with_store(&state, move |s| {
        s.associations().get_associations(&from_type, &from_id, &to_type)
    })
    .await?;
    Ok(Json(Results { results }))
}

async fn associate_default(
    State(state): State<AppState>,
    Path((from_type, from_id, to_type, to_id)): Path<(String, String, String, String)>,
) -> ApiResult<Json<BatchResult<DefaultAssociation>>> {
    let started_at = now_timestamp();
    let result = with_store(&state, move |s| {
        let spec = s
            .associations()
            .associate_default(&from_type, &from_id, &to_type, &to_id)?;
        Ok(DefaultAssociation {
            from: ObjectId::new(from_id),
            to: ObjectId::new(to_id),
            association_spec: spec,
        })
    })
    .await?;
    Ok(Json(BatchResult::complete(started_at, vec![result], Vec::new())))
}

async fn associate_with_labels(
    State(state): State<AppState>,
    Path((from_type, from_id, to_type, to_id)): Path<(String, String, String, String)>,
    Json(types): Json<Vec<AssociationSpec>>,
) -> ApiResult<(StatusCode, Json<LabelsBetweenObjectPair>)> {
    let result = with_store(&state, move |s| {
        s.associations()
            .associate_with_labels(&from_type, &from_id, &to_type, &to_id, &types)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

async fn remove_associations(
    State(state): State<AppState>,
    Path((from_type, from_id, to_type, to_id)): Path<(String, String, String, String)>,
) -> ApiResult<StatusCode> {
    with_store(&state, move |s| {
        s.associations()
            .remove_associations(&from_type, &from_id, &to_type, &to_id)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ========== Batch Operations ==========

async fn batch_associate_default(
    State(state): State<AppState>,
    Path((from_type, to_type)): Path<(String, String)>,
    Json(body): Json<BatchInputs<AssociationPairInput>>,
) -> ApiResult<Response> {
    let batch = with_store(&state, move |s| {
        s.associations()
            .batch_associate_default(&from_type, &to_type, &body.inputs)
    })
    .await?;
    Ok(batch_response(StatusCode::OK, batch))
}

async fn batch_create(
    State(state): State<AppState>,
    Path((from_type, to_type)): Path<(String, String)>,
    Json(body): Json<BatchInputs<LabeledAssociationInput>>,
) -> ApiResult<Response> {
    let batch = with_store(&state, move |s| {
        s.associations().batch_create(&from_type, &to_type, &body.inputs)
    })
    .await?;
    Ok(batch_response(StatusCode::CREATED, batch))
}

async fn batch_read(
    State(state): State<AppState>,
    Path((from_type, to_type)): Path<(String, String)>,
    Json(body): Json<BatchInputs<ObjectId>>,
) -> ApiResult<Response> {
    let batch = with_store(&state, move |s| {
        s.associations().batch_read(&from_type, &to_type, &body.inputs)
    })
    .await?;
    Ok(batch_response(StatusCode::OK, batch))
}

async fn batch_archive(
    State(state): State<AppState>,
    Path((from_type, to_type)): Path<(String, String)>,
    Json(body): Json<BatchInputs<ArchiveInput>>,
) -> ApiResult<StatusCode> {
    with_store(&state, move |s| {
        s.associations().batch_archive(&from_type, &to_type, &body.inputs)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn batch_archive_labels(
    State(state): State<AppState>,
    Path((from_type, to_type)): Path<(String, String)>,
    Json(body): Json<BatchInputs<LabeledAssociationInput>>,
) -> ApiResult<StatusCode> {
    with_store(&state, move |s| {
        s.associations()
            .batch_archive_labels(&from_type, &to_type, &body.inputs)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ========== Labels ==========

async fn list_labels(
    State(state): State<AppState>,
    Path((from_type, to_type)): Path<(String, String)>,
) -> ApiResult<Json<Results<AssociationType>>> {
    let results = with_store(&state, move |s| s.associations().list_labels(&from_type, &to_type)).await?;
    Ok(Json(Results { results }))
}

async fn create_label(
    State(state): State<AppState>,
    Path((from_type, to_type)): Path<(String, String)>,
    Json(input): Json<LabelInput>,
) -> ApiResult<Json<Results<AssociationType>>> {
    let results = with_store(&state, move |s| {
        s.associations().create_label(&from_type, &to_type, input)
    })
    .await?;
    Ok(Json(Results { results }))
}

async fn update_label(
    State(state): State<AppState>,
    Path((from_type, to_type)): Path<(String, String)>,
    Json(input): Json<LabelUpdate>,
) -> ApiResult<Json<AssociationType>> {
    let updated = with_store(&state, move |s| {
        s.associations().update_label(&from_type, &to_type, input)
    })
    .await?;
    Ok(Json(updated))
}

async fn delete_label(
    State(state): State<AppState>,
    Path((from_type, to_type, type_id)): Path<(String, String, i64)>,
) -> ApiResult<StatusCode> {
    with_store(&state, move |s| {
        s.associations().delete_label(&from_type, &to_type, type_id)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
