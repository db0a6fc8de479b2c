//! `/crm/v3/owners` - read-only; owners come from configuration

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::Deserialize;

use crate::model::Page;
use crate::server::{ApiResult, AppState, with_store};
use crate::storage::owners::{Owner, OwnerListOptions};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/crm/v3/owners", get(list_owners))
        .route("/crm/v3/owners/{owner_id}", get(get_owner))
}

#[derive(Debug, Default, Deserialize)]
pub struct OwnerParams {
    pub email: Option<String>,
    pub limit: Option<usize>,
    pub after: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

async fn list_owners(
    State(state): State<AppState>,
    Query(params): Query<OwnerParams>,
) -> ApiResult<Json<Page<Owner>>> {
    let options = OwnerListOptions {
        email: params.email,
        limit: params.limit.unwrap_or(0),
        after: params.after,
        archived: params.archived,
    };
    let page = with_store(&state, move |s| s.owners().list(&options)).await?;
    Ok(Json(page))
}

async fn get_owner(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> ApiResult<Json<Owner>> {
    let owner = with_store(&state, move |s| s.owners().get(&owner_id)).await?;
    Ok(Json(owner))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::server::routes::testing::send;
    use crate::server::{AppState, create_router};
    use crate::storage::Store;
    use crate::storage::owners::OwnerInput;

    #[tokio::test]
    async fn test_list_and_get_owner() {
        let store = Store::open_in_memory().unwrap();
        let owner = store
            .session()
            .owners()
            .ensure(&OwnerInput {
                email: "sam@example.com".to_string(),
                first_name: "Sam".to_string(),
                last_name: "Sales".to_string(),
                user_id: None,
            })
            .unwrap();
        let app = create_router(AppState::new(store));

        let (status, body) = send(&app, "GET", "/crm/v3/owners?email=sam@example.com", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"][0]["firstName"], "Sam");

        let (status, body) = send(&app, "GET", &format!("/crm/v3/owners/{}", owner.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "sam@example.com");

        let (status, _) = send(&app, "GET", "/crm/v3/owners/9999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
