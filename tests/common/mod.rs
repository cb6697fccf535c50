#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use rusqlite::params;
use tempfile::TempDir;
use tower::ServiceExt;

use quill::auth::session::create_session;
use quill::config::{Cli, Config};
use quill::db;
use quill::routes::build_router;
use quill::state::AppState;

pub struct TestApp {
    pub state: AppState,
    // Kept alive so the data directory outlives the test
    _tmp: TempDir,
}

pub fn test_app() -> TestApp {
    let tmp = TempDir::new().unwrap();
    let cli = Cli {
        config: None,
        host: None,
        port: None,
        data_dir: Some(tmp.path().to_path_buf()),
    };
    let config = Config::load(&cli).unwrap();
    std::fs::create_dir_all(config.uploads_path()).unwrap();

    let pool = db::create_pool(config.db_path()).unwrap();
    db::run_migrations(&pool).unwrap();

    TestApp {
        state: AppState::new(pool, config),
        _tmp: tmp,
    }
}

impl TestApp {
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub fn seed_user(&self, username: &str) -> String {
        let id = uuid::Uuid::now_v7().to_string();
        self.state
            .db
            .get()
            .unwrap()
            .execute(
                "INSERT INTO users (id, username, password_hash) VALUES (?1, ?2, 'x')",
                params![id, username],
            )
            .unwrap();
        id
    }

    /// Creates a session for the user and returns the Cookie header value.
    pub fn login(&self, user_id: &str) -> String {
        let token = create_session(&self.state.db, user_id, 1).unwrap();
        format!("{}={}", self.state.config.auth.cookie_name, token)
    }

    pub fn seed_group(&self, title: &str, slug: &str) -> String {
        let id = uuid::Uuid::now_v7().to_string();
        self.state
            .db
            .get()
            .unwrap()
            .execute(
                "INSERT INTO groups (id, title, slug) VALUES (?1, ?2, ?3)",
                params![id, title, slug],
            )
            .unwrap();
        id
    }

    pub fn seed_post(&self, author_id: &str, group_id: Option<&str>, text: &str) -> String {
        let id = uuid::Uuid::now_v7().to_string();
        self.state
            .db
            .get()
            .unwrap()
            .execute(
                "INSERT INTO posts (id, author_id, group_id, text) VALUES (?1, ?2, ?3, ?4)",
                params![id, author_id, group_id, text],
            )
            .unwrap();
        id
    }

    pub fn post_count(&self) -> i64 {
        self.state
            .db
            .get()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM posts", [], |r| r.get(0))
            .unwrap()
    }

    pub fn comment_count(&self, post_id: &str) -> i64 {
        self.state
            .db
            .get()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
                params![post_id],
                |r| r.get(0),
            )
            .unwrap()
    }

    pub fn follow_count(&self) -> i64 {
        self.state
            .db
            .get()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM follows", [], |r| r.get(0))
            .unwrap()
    }

    pub fn post_fields(&self, post_id: &str) -> (String, Option<String>, Option<String>, Option<String>) {
        self.state
            .db
            .get()
            .unwrap()
            .query_row(
                "SELECT text, author_id, group_id, image_path FROM posts WHERE id = ?1",
                params![post_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap()
    }
}

pub async fn get(app: &TestApp, path: &str, cookie: Option<&str>) -> Response<Body> {
    let mut builder = Request::builder().uri(path);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let request = builder.body(Body::empty()).unwrap();
    app.router().oneshot(request).await.unwrap()
}

pub async fn post_urlencoded(
    app: &TestApp,
    path: &str,
    body: &str,
    cookie: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();
    app.router().oneshot(request).await.unwrap()
}

const BOUNDARY: &str = "quill-test-boundary";

/// Builds a multipart/form-data body for the post form.
pub fn multipart_body(
    fields: &[(&str, &str)],
    image: Option<(&str, &str, &[u8])>,
) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content_type, bytes)) = image {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, file_name, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    (
        format!("multipart/form-data; boundary={}", BOUNDARY),
        body,
    )
}

pub async fn post_multipart(
    app: &TestApp,
    path: &str,
    fields: &[(&str, &str)],
    image: Option<(&str, &str, &[u8])>,
    cookie: Option<&str>,
) -> Response<Body> {
    let (content_type, body) = multipart_body(fields, image);
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, content_type);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let request = builder.body(Body::from(body)).unwrap();
    app.router().oneshot(request).await.unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub fn assert_redirect(response: &Response<Body>, target: &str) {
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(response), target);
}
