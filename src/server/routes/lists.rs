//! `/crm/v3/lists` - manual lists and memberships

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::model::Page;
use crate::server::{ApiResult, AppState, with_store};
use crate::storage::lists::{CrmList, ListInput, Membership, MembershipChange};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/crm/v3/lists", post(create_list))
        .route(
            "/crm/v3/lists/object-type-id/{object_type}/name/{name}",
            get(get_list_by_name),
        )
        .route("/crm/v3/lists/{list_id}", get(get_list).delete(delete_list))
        .route("/crm/v3/lists/{list_id}/update-list-name", put(update_list_name))
        .route("/crm/v3/lists/{list_id}/memberships", get(list_memberships))
        .route("/crm/v3/lists/{list_id}/memberships/add", put(add_members))
        .route("/crm/v3/lists/{list_id}/memberships/remove", put(remove_members))
}

/// `{"list": {...}}`
#[derive(Debug, Serialize)]
pub struct ListEnvelope {
    pub list: CrmList,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameParams {
    pub list_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct MembershipParams {
    pub limit: Option<usize>,
    pub after: Option<String>,
}

async fn create_list(
    State(state): State<AppState>,
    Json(input): Json<ListInput>,
) -> ApiResult<Json<ListEnvelope>> {
    let list = with_store(&state, move |s| s.lists().create(input)).await?;
    Ok(Json(ListEnvelope { list }))
}

async fn get_list(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
) -> ApiResult<Json<ListEnvelope>> {
    let list = with_store(&state, move |s| s.lists().get(&list_id)).await?;
    Ok(Json(ListEnvelope { list }))
}

async fn get_list_by_name(
    State(state): State<AppState>,
    Path((object_type, name)): Path<(String, String)>,
) -> ApiResult<Json<ListEnvelope>> {
    let list = with_store(&state, move |s| {
        let type_id = s.resolve_type(&object_type)?;
        let list = s.lists().get_by_name(&name)?;
        if list.object_type_id != type_id {
            return Err(Error::not_found("list", name));
        }
        Ok(list)
    })
    .await?;
    Ok(Json(ListEnvelope { list }))
}

async fn update_list_name(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
    Query(params): Query<RenameParams>,
) -> ApiResult<Json<ListEnvelope>> {
    let list = with_store(&state, move |s| s.lists().update_name(&list_id, &params.list_name)).await?;
    Ok(Json(ListEnvelope { list }))
}

async fn delete_list(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
) -> ApiResult<StatusCode> {
    with_store(&state, move |s| s.lists().delete(&list_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_memberships(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
    Query(params): Query<MembershipParams>,
) -> ApiResult<Json<Page<Membership>>> {
    let page = with_store(&state, move |s| {
        s.lists()
            .memberships(&list_id, params.limit.unwrap_or(0), params.after.as_deref())
    })
    .await?;
    Ok(Json(page))
}

async fn add_members(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
    Json(record_ids): Json<Vec<String>>,
) -> ApiResult<Json<MembershipChange>> {
    let change = with_store(&state, move |s| s.lists().add_members(&list_id, &record_ids)).await?;
    Ok(Json(change))
}

async fn remove_members(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
    Json(record_ids): Json<Vec<String>>,
) -> ApiResult<Json<MembershipChange>> {
    let change = with_store(&state, move |s| s.lists().remove_members(&list_id, &record_ids)).await?;
    Ok(Json(change))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::server::routes::testing::{app, create, send};

    #[tokio::test]
    async fn test_list_membership_flow() {
        let app = app();
        let input = json!({"name": "VIPs", "objectTypeId": "0-1", "processingType": "MANUAL"});
        let (status, body) = send(&app, "POST", "/crm/v3/lists", Some(input.clone())).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        let list_id = body["list"]["listId"].as_str().unwrap().to_string();

        let (status, body) = send(&app, "POST", "/crm/v3/lists", Some(input)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["category"], "CONFLICT");

        let contact = create(&app, "contacts", json!({"email": "a@x.com"})).await;
        let uri = format!("/crm/v3/lists/{}/memberships/add", list_id);
        let (status, body) = send(&app, "PUT", &uri, Some(json!([contact, "99999"]))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["recordIdsAdded"], json!([contact]));
        assert_eq!(body["recordIdsMissing"], json!(["99999"]));

        let uri = format!("/crm/v3/lists/{}/memberships", list_id);
        let (_, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(body["results"][0]["recordId"], contact.as_str());

        let (status, body) = send(&app, "GET", "/crm/v3/lists/object-type-id/0-1/name/VIPs", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["list"]["size"], 1);

        let (status, _) = send(&app, "GET", "/crm/v3/lists/object-type-id/0-2/name/VIPs", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rename_list() {
        let app = app();
        let input = json!({"name": "Old", "objectTypeId": "contacts"});
        let (_, body) = send(&app, "POST", "/crm/v3/lists", Some(input)).await;
        let list_id = body["list"]["listId"].as_str().unwrap().to_string();

        let uri = format!("/crm/v3/lists/{}/update-list-name?listName=New", list_id);
        let (status, body) = send(&app, "PUT", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["list"]["name"], "New");
    }
}
