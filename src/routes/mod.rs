pub mod about;
pub mod feed;
pub mod posts;
pub mod profile;

use askama::Template;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::auth::handlers as auth_handlers;
use crate::state::AppState;

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => html_response(body),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

/// A pre-rendered HTML body as a 200 response.
pub fn html_response(body: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        body,
    )
        .into_response()
}

pub fn build_router(state: AppState) -> Router {
    let media_dir = state.config.uploads_path().clone();

    Router::new()
        .route("/", get(feed::index))
        .route("/group/{slug}", get(feed::group_posts))
        .route("/profile/{username}", get(feed::profile))
        .route("/follow", get(feed::follow_index))
        .route("/posts/{id}", get(posts::post_detail))
        .route("/create", get(posts::create_page).post(posts::create_post))
        .route(
            "/posts/{id}/edit",
            get(posts::edit_page).post(posts::edit_post),
        )
        .route("/posts/{id}/comment", post(posts::add_comment))
        .route("/profile/{username}/follow", get(profile::follow))
        .route("/profile/{username}/unfollow", get(profile::unfollow))
        .route("/about/author", get(about::author))
        .route("/about/tech", get(about::tech))
        .route(
            "/auth/login",
            get(auth_handlers::login_page).post(auth_handlers::login),
        )
        .route(
            "/auth/signup",
            get(auth_handlers::signup_page).post(auth_handlers::signup),
        )
        .route("/auth/logout", post(auth_handlers::logout))
        .nest_service("/media", ServeDir::new(media_dir))
        .nest_service("/assets", ServeDir::new("assets"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
