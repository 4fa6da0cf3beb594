pub mod admin;
pub mod auth;
pub mod blobs;
pub mod comments;
pub mod graphql;
pub mod live;
pub mod notifications;
pub mod posts;
pub mod profile;

use axum::extract::multipart::MultipartError;
use axum::extract::DefaultBodyLimit;
use axum::Router;

use crate::error::AppError;
use crate::state::AppState;

/// The full HTTP surface, ready to serve.
pub fn app(state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.config.max_upload_bytes());

    Router::new()
        .merge(auth::router())
        .merge(posts::router().layer(upload_limit.clone()))
        .merge(comments::router())
        .merge(notifications::router())
        .merge(profile::router().layer(upload_limit))
        .merge(live::router())
        .merge(admin::router())
        .merge(blobs::router())
        .merge(graphql::router())
        .with_state(state)
}

pub(crate) fn multipart_error(err: MultipartError) -> AppError {
    AppError::BadRequest(format!("Invalid upload: {}", err.body_text()))
}
