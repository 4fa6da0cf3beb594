use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::accounts::users_collection;
use crate::error::{ActionContext, AppResult};
use crate::extractors::AdminUser;
use crate::feed::posts_collection;
use crate::notifications::notifications_collection;
use crate::state::AppState;
use crate::store::{CollectionPath, Query};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub users: usize,
    pub posts: usize,
    pub notifications: usize,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/admin/overview", get(overview))
}

async fn count(state: &AppState, collection: CollectionPath) -> AppResult<usize> {
    let docs = state
        .store
        .query(&Query::collection(collection))
        .await
        .or_failed("Failed to load dashboard.")?;
    Ok(docs.len())
}

/// GET /api/admin/overview
async fn overview(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> AppResult<Json<Overview>> {
    tracing::debug!(uid = %admin.uid(), "Admin overview requested");
    Ok(Json(Overview {
        users: count(&state, users_collection()).await?,
        posts: count(&state, posts_collection()).await?,
        notifications: count(&state, notifications_collection()).await?,
    }))
}
