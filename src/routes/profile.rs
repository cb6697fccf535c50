use axum::extract::{Path, State};
use axum::response::Redirect;
use rusqlite::params;

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

/// Create a follow edge to `username`. Idempotent: following yourself or an
/// author you already follow leaves at most one edge (the schema backs this
/// with UNIQUE and CHECK constraints, the insert uses OR IGNORE).
pub async fn follow(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(username): Path<String>,
) -> AppResult<Redirect> {
    let conn = state.db.get()?;

    let target_id: String = conn
        .query_row(
            "SELECT id FROM users WHERE username = ?1",
            params![username],
            |r| r.get(0),
        )
        .map_err(|_| AppError::NotFound)?;

    if target_id != user.id {
        let edge_id = uuid::Uuid::now_v7().to_string();
        conn.execute(
            "INSERT OR IGNORE INTO follows (id, follower_id, followed_id) VALUES (?1, ?2, ?3)",
            params![edge_id, user.id, target_id],
        )?;
    }

    Ok(Redirect::to(&format!("/profile/{}", username)))
}

/// Remove the follow edge to `username` if present. Removing an absent edge
/// is a no-op, not an error.
pub async fn unfollow(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(username): Path<String>,
) -> AppResult<Redirect> {
    let conn = state.db.get()?;

    let target_id: String = conn
        .query_row(
            "SELECT id FROM users WHERE username = ?1",
            params![username],
            |r| r.get(0),
        )
        .map_err(|_| AppError::NotFound)?;

    conn.execute(
        "DELETE FROM follows WHERE follower_id = ?1 AND followed_id = ?2",
        params![user.id, target_id],
    )?;

    Ok(Redirect::to(&format!("/profile/{}", username)))
}
