use axum::extract::{Multipart, Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::routes::multipart_error;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bio: String,
}

/// Another user's profile. Email and role stay private to the owner.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub uid: String,
    pub username: String,
    pub name: String,
    pub bio: String,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
}

impl From<User> for PublicProfile {
    fn from(user: User) -> Self {
        Self {
            uid: user.uid,
            username: user.username,
            name: user.name,
            bio: user.bio,
            photo_url: user.photo_url,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/profile", get(me).put(update_profile))
        .route("/api/profile/photo", post(upload_photo))
        .route("/api/users/{uid}", get(user_profile))
}

async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<User>> {
    Ok(Json(state.accounts().profile(user.uid()).await?))
}

async fn user_profile(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(uid): Path<String>,
) -> AppResult<Json<PublicProfile>> {
    let user = state.accounts().profile(&uid).await?;
    Ok(Json(PublicProfile::from(user)))
}

async fn update_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(form): Json<ProfileForm>,
) -> AppResult<Json<User>> {
    let updated = state
        .accounts()
        .update_profile(&user.session, &form.name, &form.bio)
        .await?;
    Ok(Json(updated))
}

/// POST /api/profile/photo - multipart with a single `photo` file.
async fn upload_photo(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<Json<serde_json::Value>> {
    let mut photo = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("photo") {
            photo = Some(field.bytes().await.map_err(multipart_error)?);
        }
    }
    let photo = photo.ok_or_else(|| AppError::BadRequest("No image provided.".into()))?;

    let url = state.accounts().upload_photo(&user.session, photo).await?;
    Ok(Json(serde_json::json!({ "photoURL": url })))
}
