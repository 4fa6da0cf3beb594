use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use crate::auth::Session;
use crate::db::models::Role;
use crate::error::AppError;
use crate::state::AppState;

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub session: Session,
    pub role: Role,
}

impl CurrentUser {
    pub fn uid(&self) -> &str {
        &self.session.uid
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Extractor that requires authentication.
/// Accepts `Authorization: Bearer <token>` or the session cookie. Returns 401
/// if neither carries a live session.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .or_else(|| cookie_value(parts, &state.config.auth.cookie_name))
            .ok_or(AppError::Unauthorized)?;

        let session = state
            .identity
            .authenticate(token)?
            .ok_or(AppError::Unauthorized)?;
        let role = state.accounts().role_of(&session.uid).await?;

        Ok(CurrentUser { session, role })
    }
}

/// Requires the admin role. Returns 403 for signed-in non-admins.
pub struct AdminUser(pub CurrentUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}

/// Optional user extractor - returns None instead of 401 when not authenticated.
pub struct MaybeUser(pub Option<CurrentUser>);

impl MaybeUser {
    pub fn uid(&self) -> Option<&str> {
        self.0.as_ref().map(CurrentUser::uid)
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(AppError::Unauthorized) => Ok(MaybeUser(None)),
            Err(e) => Err(e),
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub(crate) fn cookie_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name {
                Some(val)
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(header_name: header::HeaderName, value: &str) -> Parts {
        let (parts, _) = Request::builder()
            .header(header_name, value)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn bearer_token_is_read_from_authorization() {
        let p = parts(header::AUTHORIZATION, "Bearer abc123");
        assert_eq!(bearer_token(&p), Some("abc123"));
    }

    #[test]
    fn other_schemes_are_ignored() {
        let p = parts(header::AUTHORIZATION, "Basic Zm9vOmJhcg==");
        assert_eq!(bearer_token(&p), None);
    }

    #[test]
    fn cookie_is_found_among_others() {
        let p = parts(header::COOKIE, "theme=dark; safewalk_session=tok; lang=en");
        assert_eq!(cookie_value(&p, "safewalk_session"), Some("tok"));
        assert_eq!(cookie_value(&p, "missing"), None);
    }
}
