use askama::Template;
use axum::extract::{Multipart, Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use rusqlite::params;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::forms::{is_image_upload, CommentForm, PostForm};
use crate::routes::feed::{parse_and_format_time, GroupRef, PostCard};
use crate::routes::Html;
use crate::state::AppState;

// --- View structs ---

pub struct CommentView {
    pub author: String,
    pub text: String,
    pub created_at: String,
}

pub struct GroupOption {
    pub id: String,
    pub title: String,
}

// --- Templates ---

#[derive(Template)]
#[template(path = "pages/post_detail.html")]
pub struct PostDetailTemplate {
    pub post: PostCard,
    pub comments: Vec<CommentView>,
    pub can_edit: bool,
    pub username: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/post_form.html")]
pub struct PostFormTemplate {
    pub is_edit: bool,
    pub post_id: String,
    pub text: String,
    pub selected_group: String,
    pub groups: Vec<GroupOption>,
    pub error: Option<String>,
    pub username: Option<String>,
}

// --- Forms ---

#[derive(Deserialize)]
pub struct CommentBody {
    pub text: String,
}

/// Fields read out of the multipart post form.
struct PostSubmission {
    text: String,
    group_id: Option<String>,
    image: Option<UploadedImage>,
}

struct UploadedImage {
    file_name: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

// --- Handlers ---

/// Post detail: the post, its comments in insertion order, and the comment
/// form (rendered by the template when the viewer is signed in).
pub async fn post_detail(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Html<PostDetailTemplate>> {
    let conn = state.db.get()?;

    let (post, author_id) = load_post_card(&conn, &id)?;

    let mut stmt = conn.prepare(
        "SELECT u.username, c.text, c.created_at
         FROM comments c
         JOIN users u ON u.id = c.author_id
         WHERE c.post_id = ?1
         ORDER BY c.created_at ASC, c.id ASC",
    )?;
    let comments = stmt
        .query_map(params![id], |row| {
            let created_at_raw: String = row.get(2)?;
            Ok(CommentView {
                author: row.get(0)?,
                text: row.get(1)?,
                created_at: parse_and_format_time(&created_at_raw),
            })
        })?
        .filter_map(|r| r.ok())
        .collect();

    let can_edit = match (&user, &author_id) {
        (Some(viewer), Some(author)) => &viewer.id == author,
        _ => false,
    };

    Ok(Html(PostDetailTemplate {
        post,
        comments,
        can_edit,
        username: user.map(|u| u.username),
    }))
}

pub async fn create_page(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Html<PostFormTemplate>> {
    let conn = state.db.get()?;
    Ok(Html(PostFormTemplate {
        is_edit: false,
        post_id: String::new(),
        text: String::new(),
        selected_group: String::new(),
        groups: load_groups(&conn)?,
        error: None,
        username: Some(user.username),
    }))
}

/// Create a post from the multipart form. Validation failure redisplays the
/// form with the error and persists nothing; success redirects to the
/// author's profile.
pub async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Response> {
    let submission = read_post_submission(multipart).await?;

    let validated = match validate_submission(&state, &submission)? {
        Ok(form) => form,
        Err(error) => {
            let conn = state.db.get()?;
            return Ok(Html(PostFormTemplate {
                is_edit: false,
                post_id: String::new(),
                text: submission.text.clone(),
                selected_group: submission.group_id.clone().unwrap_or_default(),
                groups: load_groups(&conn)?,
                error: Some(error),
                username: Some(user.username),
            })
            .into_response());
        }
    };

    let image_path = match &submission.image {
        Some(image) => Some(save_image(&state, image)?),
        None => None,
    };

    let post_id = uuid::Uuid::now_v7().to_string();
    {
        let conn = state.db.get()?;
        conn.execute(
            "INSERT INTO posts (id, author_id, group_id, text, image_path)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![post_id, user.id, validated.group_id, validated.text, image_path],
        )?;
    }

    Ok(Redirect::to(&format!("/profile/{}", user.username)).into_response())
}

pub async fn edit_page(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;

    let (author_id, text, group_id): (Option<String>, String, Option<String>) = conn
        .query_row(
            "SELECT author_id, text, group_id FROM posts WHERE id = ?1",
            params![id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .map_err(|_| AppError::NotFound)?;

    // Only the author gets the edit form; everyone else bounces to the post.
    if author_id.as_deref() != Some(user.id.as_str()) {
        return Ok(Redirect::to(&format!("/posts/{}", id)).into_response());
    }

    Ok(Html(PostFormTemplate {
        is_edit: true,
        post_id: id,
        text,
        selected_group: group_id.unwrap_or_default(),
        groups: load_groups(&conn)?,
        error: None,
        username: Some(user.username),
    })
    .into_response())
}

/// Update a post in place. A non-author is silently redirected to the post
/// detail page with nothing changed.
pub async fn edit_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    multipart: Multipart,
) -> AppResult<Response> {
    {
        let conn = state.db.get()?;
        let author_id: Option<String> = conn
            .query_row(
                "SELECT author_id FROM posts WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .map_err(|_| AppError::NotFound)?;

        if author_id.as_deref() != Some(user.id.as_str()) {
            return Ok(Redirect::to(&format!("/posts/{}", id)).into_response());
        }
    }

    let submission = read_post_submission(multipart).await?;

    let validated = match validate_submission(&state, &submission)? {
        Ok(form) => form,
        Err(error) => {
            let conn = state.db.get()?;
            return Ok(Html(PostFormTemplate {
                is_edit: true,
                post_id: id,
                text: submission.text.clone(),
                selected_group: submission.group_id.clone().unwrap_or_default(),
                groups: load_groups(&conn)?,
                error: Some(error),
                username: Some(user.username),
            })
            .into_response());
        }
    };

    let conn = state.db.get()?;
    match &submission.image {
        Some(image) => {
            let image_path = save_image(&state, image)?;
            conn.execute(
                "UPDATE posts SET text = ?1, group_id = ?2, image_path = ?3 WHERE id = ?4",
                params![validated.text, validated.group_id, image_path, id],
            )?;
        }
        None => {
            conn.execute(
                "UPDATE posts SET text = ?1, group_id = ?2 WHERE id = ?3",
                params![validated.text, validated.group_id, id],
            )?;
        }
    }

    Ok(Redirect::to(&format!("/posts/{}", id)).into_response())
}

/// Add a comment. Empty text is dropped without an error page; either way
/// the client ends up back at the post detail.
pub async fn add_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Form(body): Form<CommentBody>,
) -> AppResult<Response> {
    let conn = state.db.get()?;

    // Verify post exists
    let _: String = conn
        .query_row("SELECT id FROM posts WHERE id = ?1", params![id], |r| {
            r.get(0)
        })
        .map_err(|_| AppError::NotFound)?;

    if let Ok(form) = CommentForm::validate(&body.text) {
        let comment_id = uuid::Uuid::now_v7().to_string();
        conn.execute(
            "INSERT INTO comments (id, post_id, author_id, text) VALUES (?1, ?2, ?3, ?4)",
            params![comment_id, id, user.id, form.text],
        )?;
    }

    Ok(Redirect::to(&format!("/posts/{}", id)).into_response())
}

// --- Helpers ---

fn load_post_card(
    conn: &rusqlite::Connection,
    id: &str,
) -> Result<(PostCard, Option<String>), AppError> {
    conn.query_row(
        "SELECT p.id, u.username, p.text, p.image_path, p.created_at, g.title, g.slug,
                (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id),
                p.author_id
         FROM posts p
         LEFT JOIN users u ON u.id = p.author_id
         LEFT JOIN groups g ON g.id = p.group_id
         WHERE p.id = ?1",
        params![id],
        |row| {
            let created_at_raw: String = row.get(4)?;
            let group_title: Option<String> = row.get(5)?;
            let group_slug: Option<String> = row.get(6)?;
            Ok((
                PostCard {
                    id: row.get(0)?,
                    author: row.get(1)?,
                    text: row.get(2)?,
                    image_path: row.get(3)?,
                    created_at: parse_and_format_time(&created_at_raw),
                    group: match (group_title, group_slug) {
                        (Some(title), Some(slug)) => Some(GroupRef { title, slug }),
                        _ => None,
                    },
                    comment_count: row.get(7)?,
                },
                row.get::<_, Option<String>>(8)?,
            ))
        },
    )
    .map_err(|_| AppError::NotFound)
}

fn load_groups(conn: &rusqlite::Connection) -> Result<Vec<GroupOption>, AppError> {
    let mut stmt = conn.prepare("SELECT id, title FROM groups ORDER BY title ASC")?;
    let groups = stmt
        .query_map([], |row| {
            Ok(GroupOption {
                id: row.get(0)?,
                title: row.get(1)?,
            })
        })?
        .filter_map(|r| r.ok())
        .collect();
    Ok(groups)
}

async fn read_post_submission(mut multipart: Multipart) -> AppResult<PostSubmission> {
    let mut text = String::new();
    let mut group_id = None;
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("text") => {
                text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
            }
            Some("group") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                if !value.trim().is_empty() {
                    group_id = Some(value.trim().to_string());
                }
            }
            Some("image") => {
                let file_name = field.file_name().map(str::to_string).unwrap_or_default();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                // Browsers submit an empty part when no file was chosen
                if !file_name.is_empty() && !bytes.is_empty() {
                    image = Some(UploadedImage {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            _ => {}
        }
    }

    Ok(PostSubmission {
        text,
        group_id,
        image,
    })
}

/// Validates text, group reference, and image type. Returns the field error
/// to redisplay rather than failing the request.
fn validate_submission(
    state: &AppState,
    submission: &PostSubmission,
) -> Result<Result<PostForm, String>, AppError> {
    let form = match PostForm::validate(&submission.text, submission.group_id.clone()) {
        Ok(form) => form,
        Err(msg) => return Ok(Err(msg.to_string())),
    };

    if let Some(group_id) = &form.group_id {
        let conn = state.db.get()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM groups WHERE id = ?1)",
            params![group_id],
            |r| r.get(0),
        )?;
        if !exists {
            return Ok(Err("Choose a valid group".to_string()));
        }
    }

    if let Some(image) = &submission.image {
        if !is_image_upload(image.content_type.as_deref(), &image.file_name) {
            return Ok(Err("The attached file must be an image".to_string()));
        }
    }

    Ok(Ok(form))
}

/// Writes the uploaded image under the uploads directory and returns the
/// path relative to it (what gets stored and served at /media/...).
fn save_image(state: &AppState, image: &UploadedImage) -> Result<String, AppError> {
    let ext = image
        .content_type
        .as_deref()
        .and_then(|ct| ct.strip_prefix("image/"))
        .map(str::to_string)
        .or_else(|| {
            std::path::Path::new(&image.file_name)
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
        })
        .unwrap_or_else(|| "img".to_string());

    let relative = format!("posts/{}.{}", uuid::Uuid::now_v7(), ext);
    let dest = state.config.uploads_path().join(&relative);
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&dest, &image.bytes)?;

    Ok(relative)
}
