use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::models::{Notification, NotificationKind};
use crate::error::{ActionContext, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

/// A notification as its recipient sees it. Sender and recipient uids stay
/// in the stored document so anonymous authors are not exposed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: String,
    pub from_username: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub post_title: String,
    pub post_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl From<&Notification> for NotificationView {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id.clone(),
            from_username: n.from_username.clone(),
            kind: n.kind,
            post_title: n.post_title.clone(),
            post_id: n.post_id.clone(),
            created_at: n.created_at,
            read: n.read,
        }
    }
}

impl NotificationView {
    pub fn list(notifications: &[Notification]) -> Vec<Self> {
        notifications.iter().map(Self::from).collect()
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/notifications",
            get(list_notifications).delete(clear_notifications),
        )
        .route("/api/notifications/read", post(mark_read))
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/{id}", delete(delete_notification))
}

async fn list_notifications(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<NotificationView>>> {
    let list = state
        .notifications()
        .list(user.uid())
        .await
        .or_failed("Failed to load notifications.")?;
    Ok(Json(NotificationView::list(&list)))
}

async fn clear_notifications(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<serde_json::Value>> {
    let cleared = state
        .notifications()
        .clear(&user.session)
        .await
        .or_failed("Failed to clear notifications.")?;
    Ok(Json(serde_json::json!({ "cleared": cleared })))
}

async fn delete_notification(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state
        .notifications()
        .delete(&user.session, &id)
        .await
        .or_failed("Failed to delete notification.")?;
    Ok(StatusCode::NO_CONTENT)
}

async fn mark_read(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<serde_json::Value>> {
    let updated = state
        .notifications()
        .mark_all_read(&user.session)
        .await
        .or_failed("Failed to update notifications.")?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}

async fn unread_count(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<serde_json::Value>> {
    let count = state
        .notifications()
        .unread_count(user.uid())
        .await
        .or_failed("Failed to load notifications.")?;
    Ok(Json(serde_json::json!({ "count": count })))
}
