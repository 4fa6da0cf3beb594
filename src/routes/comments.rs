use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::comments::CommentAuthor;
use crate::db::models::Comment;
use crate::error::{ActionContext, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateCommentForm {
    pub text: String,
    #[serde(default)]
    pub anonymous: bool,
}

/// A comment as one viewer sees it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub text: String,
    pub anonymous: bool,
    pub created_at: DateTime<Utc>,
    pub mine: bool,
}

impl CommentView {
    pub fn for_viewer(comment: &Comment, viewer: Option<&str>) -> Self {
        let anonymous = comment.anonymous.is_anonymous();
        Self {
            id: comment.id.clone(),
            display_name: comment.display_name().to_string(),
            avatar_url: if anonymous {
                None
            } else {
                comment.photo_url.clone()
            },
            text: comment.text.clone(),
            anonymous,
            created_at: comment.created_at,
            mine: viewer.is_some_and(|uid| uid == comment.user_id),
        }
    }

    pub fn list(comments: &[Comment], viewer: Option<&str>) -> Vec<Self> {
        comments
            .iter()
            .map(|c| Self::for_viewer(c, viewer))
            .collect()
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/posts/{id}/comments",
            get(list_comments).post(create_comment),
        )
        .route(
            "/api/posts/{id}/comments/{comment_id}",
            delete(delete_comment),
        )
}

async fn list_comments(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(post_id): Path<String>,
) -> AppResult<Json<Vec<CommentView>>> {
    let comments = state
        .comments()
        .list(&post_id)
        .await
        .or_failed("Failed to load comments.")?;
    Ok(Json(CommentView::list(&comments, user.uid())))
}

async fn create_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<String>,
    Json(form): Json<CreateCommentForm>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let profile = state.accounts().profile(user.uid()).await?;
    let id = state
        .comments()
        .add_comment(&post_id, &form.text, &CommentAuthor::from(&profile), form.anonymous)
        .await
        .or_failed("Failed to add comment.")?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

async fn delete_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((post_id, comment_id)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    state
        .comments()
        .delete_comment(&post_id, &comment_id, &user.session)
        .await
        .or_failed("Failed to delete comment.")?;
    Ok(StatusCode::NO_CONTENT)
}
