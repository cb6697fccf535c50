use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Redirect, Response};
use rusqlite::params;

use crate::auth::session::token_from_headers;
use crate::error::AppError;
use crate::state::AppState;

/// Represents the currently authenticated user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
}

/// Rejection for protected routes: unauthenticated requests are redirected to
/// the login page with a `next` parameter pointing back at the original URL.
pub enum AuthRejection {
    LoginRedirect(String),
    Error(AppError),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            AuthRejection::LoginRedirect(next) => {
                Redirect::to(&format!("/auth/login?next={}", next)).into_response()
            }
            AuthRejection::Error(e) => e.into_response(),
        }
    }
}

/// Extractor that requires authentication.
/// Redirects to the login page if no valid session is found.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let next = parts.uri.path().to_string();

        let token = token_from_headers(&parts.headers, &state.config.auth.cookie_name)
            .ok_or_else(|| AuthRejection::LoginRedirect(next.clone()))?;

        let conn = state.db.get().map_err(|e| AuthRejection::Error(e.into()))?;
        conn.query_row(
            "SELECT u.id, u.username FROM sessions s \
             JOIN users u ON u.id = s.user_id \
             WHERE s.token = ?1 AND s.expires_at > datetime('now')",
            params![token],
            |row| {
                Ok(CurrentUser {
                    id: row.get(0)?,
                    username: row.get(1)?,
                })
            },
        )
        .map_err(|_| AuthRejection::LoginRedirect(next))
    }
}

/// Optional user extractor. Returns None instead of redirecting when not
/// authenticated.
pub struct MaybeUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(_) => Ok(MaybeUser(None)),
        }
    }
}
