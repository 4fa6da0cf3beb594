use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{ActionContext, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::feed::PostCard;
use crate::posts::PostDraft;
use crate::routes::multipart_error;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct FeedParams {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct PublishedResponse {
    pub post: PostCard,
    /// Absent when the post was stored but notifications could not be sent.
    pub notified: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/posts", get(list_posts).post(create_post))
        .route("/api/posts/saved", get(saved_posts))
        .route(
            "/api/posts/{id}",
            get(get_post).put(edit_post).delete(delete_post),
        )
        .route("/api/posts/{id}/like", post(toggle_like))
        .route("/api/posts/{id}/save", post(toggle_save))
}

/// Read a post form: `title`, `location`, `description`, `anonymous`, and an
/// optional `image` file.
async fn read_draft(mut multipart: Multipart) -> AppResult<PostDraft> {
    let mut draft = PostDraft::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let data = field.bytes().await.map_err(multipart_error)?;
                draft.image = Some(data);
            }
            "title" => draft.title = field.text().await.map_err(multipart_error)?,
            "location" => draft.location = field.text().await.map_err(multipart_error)?,
            "description" => draft.description = field.text().await.map_err(multipart_error)?,
            "anonymous" => {
                let value = field.text().await.map_err(multipart_error)?;
                draft.anonymous = matches!(value.trim(), "yes" | "true" | "on" | "1");
            }
            _ => {}
        }
    }
    Ok(draft)
}

async fn list_posts(
    State(state): State<AppState>,
    user: MaybeUser,
    Query(params): Query<FeedParams>,
) -> AppResult<Json<Vec<PostCard>>> {
    let limit = state.feed_limit(params.limit);
    let posts = state
        .feed()
        .snapshot(Some(limit))
        .await
        .or_failed("Failed to load posts.")?;
    Ok(Json(PostCard::list(&posts, user.uid())))
}

async fn saved_posts(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<PostCard>>> {
    let posts = state
        .feed()
        .saved(user.uid())
        .await
        .or_failed("Failed to load saved posts.")?;
    Ok(Json(PostCard::list(&posts, Some(user.uid()))))
}

async fn get_post(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<PostCard>> {
    let post = state.feed().post(&id).await?;
    Ok(Json(PostCard::for_viewer(&post, user.uid())))
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<PublishedResponse>)> {
    let draft = read_draft(multipart).await?;
    let published = state.posts().create(&user.session, &draft).await?;
    Ok((
        StatusCode::CREATED,
        Json(PublishedResponse {
            post: PostCard::for_viewer(&published.post, Some(user.uid())),
            notified: published.notified,
        }),
    ))
}

async fn edit_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    multipart: Multipart,
) -> AppResult<Json<PostCard>> {
    let draft = read_draft(multipart).await?;
    let post = state.posts().edit(&user.session, &id, &draft).await?;
    Ok(Json(PostCard::for_viewer(&post, Some(user.uid()))))
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.posts().delete(&user.session, user.role, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_like(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let feed = state.feed();
    let post = feed.post(&id).await?;
    let liked = feed
        .toggle_like(&post, &user.session)
        .await
        .or_failed("Failed to update like.")?;
    Ok(Json(serde_json::json!({ "liked": liked })))
}

async fn toggle_save(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let feed = state.feed();
    let post = feed.post(&id).await?;
    let saved = feed
        .toggle_save(&post, &user.session)
        .await
        .or_failed("Failed to update saved posts.")?;
    Ok(Json(serde_json::json!({ "saved": saved })))
}
