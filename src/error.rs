use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::auth::IdentityError;
use crate::blob::BlobError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A store or infrastructure failure, reported under the name of the
    /// action that failed.
    #[error("{0}")]
    ActionFailed(&'static str),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Identity error: {0}")]
    Identity(IdentityError),

    #[error("Blob error: {0}")]
    Blob(BlobError),
}

impl AppError {
    /// True for failures the user cannot fix by changing their input.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AppError::Store(_) | AppError::Identity(_) | AppError::Blob(_)
        )
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AppError::NotFound,
            other => AppError::Store(other),
        }
    }
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidCredentials => AppError::Unauthorized,
            IdentityError::EmailInUse => {
                AppError::Conflict("Email is already registered.".to_string())
            }
            IdentityError::InvalidResetToken => {
                AppError::BadRequest("Reset link is invalid or has expired.".to_string())
            }
            other => AppError::Identity(other),
        }
    }
}

impl From<BlobError> for AppError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::InvalidPath(p) => AppError::BadRequest(format!("Invalid path: {}", p)),
            other => AppError::Blob(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::ActionFailed(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.to_string()),
            other => {
                tracing::error!("{}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Name the action behind an internal failure, e.g. "Failed to share post.".
/// Validation and permission errors pass through untouched.
pub trait ActionContext<T> {
    fn or_failed(self, action: &'static str) -> AppResult<T>;
}

impl<T, E: Into<AppError>> ActionContext<T> for Result<T, E> {
    fn or_failed(self, action: &'static str) -> AppResult<T> {
        self.map_err(|e| {
            let err = e.into();
            if err.is_internal() {
                tracing::error!("{} ({})", action, err);
                AppError::ActionFailed(action)
            } else {
                err
            }
        })
    }
}
