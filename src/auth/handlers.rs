use askama::Template;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use rusqlite::params;
use serde::Deserialize;

use crate::auth::session;
use crate::error::{AppError, AppResult};
use crate::routes::Html;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub error: Option<String>,
    pub next: String,
    pub username: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/signup.html")]
pub struct SignupTemplate {
    pub error: Option<String>,
    pub next: String,
    pub username: Option<String>,
}

#[derive(Deserialize)]
pub struct NextQuery {
    next: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginForm {
    username: String,
    password: String,
    next: Option<String>,
}

#[derive(Deserialize)]
pub struct SignupForm {
    username: String,
    password: String,
    next: Option<String>,
}

fn next_or_root(next: Option<String>) -> String {
    // Only same-site paths are honored as redirect targets
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") => n,
        _ => "/".to_string(),
    }
}

fn session_cookie(state: &AppState, token: &str) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        state.config.auth.cookie_name,
        token,
        state.config.auth.session_hours * 3600
    )
}

pub async fn login_page(Query(query): Query<NextQuery>) -> Html<LoginTemplate> {
    Html(LoginTemplate {
        error: None,
        next: next_or_root(query.next),
        username: None,
    })
}

pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    let next = next_or_root(form.next);

    let conn = state.db.get()?;
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT id, password_hash FROM users WHERE username = ?1",
            params![form.username],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .ok();

    let user_id = match row {
        Some((id, hash)) if bcrypt::verify(&form.password, &hash).unwrap_or(false) => id,
        _ => {
            return Ok(Html(LoginTemplate {
                error: Some("Invalid username or password".to_string()),
                next,
                username: None,
            })
            .into_response());
        }
    };

    let token = session::create_session(&state.db, &user_id, state.config.auth.session_hours)?;
    let cookie = session_cookie(&state, &token);

    Ok(([(header::SET_COOKIE, cookie)], Redirect::to(&next)).into_response())
}

pub async fn signup_page(Query(query): Query<NextQuery>) -> Html<SignupTemplate> {
    Html(SignupTemplate {
        error: None,
        next: next_or_root(query.next),
        username: None,
    })
}

pub async fn signup(
    State(state): State<AppState>,
    Form(form): Form<SignupForm>,
) -> AppResult<Response> {
    let next = next_or_root(form.next);
    let username = form.username.trim().to_string();

    let redisplay = |error: &str, next: String| {
        Html(SignupTemplate {
            error: Some(error.to_string()),
            next,
            username: None,
        })
        .into_response()
    };

    if username.is_empty() || form.password.is_empty() {
        return Ok(redisplay("Username and password are required", next));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Ok(redisplay(
            "Usernames may only contain letters, digits, '-' and '_'",
            next,
        ));
    }

    let hash = bcrypt::hash(&form.password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let user_id = uuid::Uuid::now_v7().to_string();

    let inserted = {
        let conn = state.db.get()?;
        conn.execute(
            "INSERT OR IGNORE INTO users (id, username, password_hash) VALUES (?1, ?2, ?3)",
            params![user_id, username, hash],
        )?
    };
    if inserted == 0 {
        return Ok(redisplay("That username is already taken", next));
    }

    let token = session::create_session(&state.db, &user_id, state.config.auth.session_hours)?;
    let cookie = session_cookie(&state, &token);

    Ok(([(header::SET_COOKIE, cookie)], Redirect::to(&next)).into_response())
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    if let Some(token) = session::token_from_headers(&headers, &state.config.auth.cookie_name) {
        session::delete_session(&state.db, &token)?;
    }

    let expired = format!(
        "{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0",
        state.config.auth.cookie_name
    );
    Ok(([(header::SET_COOKIE, expired)], Redirect::to("/")).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_or_root_keeps_local_paths() {
        assert_eq!(next_or_root(Some("/follow".into())), "/follow");
    }

    #[test]
    fn next_or_root_rejects_external_targets() {
        assert_eq!(next_or_root(Some("https://evil.example".into())), "/");
        assert_eq!(next_or_root(Some("//evil.example".into())), "/");
        assert_eq!(next_or_root(None), "/");
    }
}
