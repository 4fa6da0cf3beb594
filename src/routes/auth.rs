use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::accounts::{SignUpForm, SignedIn};
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ResetRequestForm {
    pub email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetConfirmForm {
    pub token: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/admin/login", post(admin_login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/password-reset", post(request_reset))
        .route("/api/auth/password-reset/confirm", post(confirm_reset))
        .route("/api/auth/username/{name}", get(username_available))
}

// -- Cookie helpers --

fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        name,
        token,
        max_age_hours * 3600
    )
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", name)
}

fn signed_in_response(state: &AppState, status: StatusCode, signed_in: SignedIn) -> Response {
    let cookie = session_cookie(
        &state.config.auth.cookie_name,
        &signed_in.session.token,
        state.config.auth.session_hours,
    );
    (
        status,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            token: signed_in.session.token,
            user: signed_in.user,
        }),
    )
        .into_response()
}

// -- Handlers --

/// POST /api/auth/signup
async fn signup(
    State(state): State<AppState>,
    Json(form): Json<SignUpForm>,
) -> AppResult<Response> {
    let signed_in = state.accounts().sign_up(&form).await?;
    Ok(signed_in_response(&state, StatusCode::CREATED, signed_in))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    Json(form): Json<LoginForm>,
) -> AppResult<Response> {
    let signed_in = state.accounts().sign_in(&form.email, &form.password).await?;
    tracing::info!(uid = %signed_in.session.uid, "User logged in");
    Ok(signed_in_response(&state, StatusCode::OK, signed_in))
}

/// POST /api/auth/admin/login
async fn admin_login(
    State(state): State<AppState>,
    Json(form): Json<LoginForm>,
) -> AppResult<Response> {
    let signed_in = state
        .accounts()
        .sign_in_admin(&form.email, &form.password)
        .await?;
    tracing::info!(uid = %signed_in.session.uid, "Admin logged in");
    Ok(signed_in_response(&state, StatusCode::OK, signed_in))
}

/// POST /api/auth/logout
async fn logout(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    state.identity.sign_out(&user.session.token)?;
    Ok((
        StatusCode::OK,
        [(
            header::SET_COOKIE,
            clear_session_cookie(&state.config.auth.cookie_name),
        )],
        Json(serde_json::json!({ "ok": true })),
    )
        .into_response())
}

/// POST /api/auth/password-reset
///
/// Always answers the same way so the endpoint cannot be used to discover
/// registered emails. Mail delivery is not wired up; the link is logged.
async fn request_reset(
    State(state): State<AppState>,
    Json(form): Json<ResetRequestForm>,
) -> AppResult<Json<serde_json::Value>> {
    if form.email.trim().is_empty() {
        return Err(AppError::BadRequest("Please enter your email.".into()));
    }
    if let Some(token) = state.identity.request_password_reset(&form.email)? {
        tracing::info!(
            "Password reset link: {}/reset-password?token={}",
            state.config.public_url(),
            token
        );
    }
    Ok(Json(serde_json::json!({ "sent": true })))
}

/// POST /api/auth/password-reset/confirm
async fn confirm_reset(
    State(state): State<AppState>,
    Json(form): Json<ResetConfirmForm>,
) -> AppResult<Json<serde_json::Value>> {
    let min = state.config.auth.min_password_length;
    if form.password != form.confirm_password {
        return Err(AppError::BadRequest("Passwords do not match.".into()));
    }
    if form.password.chars().count() < min {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {} characters.",
            min
        )));
    }
    state.identity.reset_password(&form.token, &form.password)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// GET /api/auth/username/{name}
async fn username_available(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let available = state.accounts().check_username(&name).await?;
    Ok(Json(serde_json::json!({ "available": available })))
}
