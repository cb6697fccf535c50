use askama::Template;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use chrono::{NaiveDateTime, Utc};
use rusqlite::types::ToSql;
use rusqlite::params;

use crate::cache::INDEX_CACHE_KEY;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::pagination::{page_bounds, Page, PageQuery};
use crate::routes::{html_response, Html};
use crate::state::AppState;

// --- View structs ---

pub struct PostCard {
    pub id: String,
    /// Author username; None once the account has been deleted.
    pub author: Option<String>,
    pub text: String,
    pub image_path: Option<String>,
    pub created_at: String,
    pub group: Option<GroupRef>,
    pub comment_count: i64,
}

pub struct GroupRef {
    pub title: String,
    pub slug: String,
}

pub struct GroupView {
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
}

// --- Templates ---

#[derive(Template)]
#[template(path = "pages/index.html")]
pub struct IndexTemplate {
    pub page: Page<PostCard>,
    pub username: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/group.html")]
pub struct GroupTemplate {
    pub group: GroupView,
    pub page: Page<PostCard>,
    pub username: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/profile.html")]
pub struct ProfileTemplate {
    pub author: String,
    pub post_count: i64,
    pub following: bool,
    pub is_self: bool,
    pub page: Page<PostCard>,
    pub username: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/follow.html")]
pub struct FollowTemplate {
    pub page: Page<PostCard>,
    pub username: Option<String>,
}

// --- Handlers ---

/// Global feed. The rendered body is cached under a fixed key for a short
/// window; within that window every request gets the identical payload,
/// whatever the underlying data does.
pub async fn index(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    {
        let cache = state.feed_cache.lock().await;
        if let Some(body) = cache.get(INDEX_CACHE_KEY) {
            return Ok(html_response(body));
        }
    }

    let page = {
        let conn = state.db.get()?;
        fetch_post_page(&conn, PostFilter::All, query.number())?
    };
    let username = user.map(|u| u.username);

    let body = IndexTemplate { page, username }
        .render()
        .map_err(|e| AppError::Internal(format!("Template render error: {}", e)))?;

    state
        .feed_cache
        .lock()
        .await
        .set(INDEX_CACHE_KEY, body.clone());

    Ok(html_response(body))
}

/// Posts filtered to one group, looked up by slug.
pub async fn group_posts(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Html<GroupTemplate>> {
    let conn = state.db.get()?;

    let (group_id, group) = conn
        .query_row(
            "SELECT id, title, slug, description FROM groups WHERE slug = ?1",
            params![slug],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    GroupView {
                        title: r.get(1)?,
                        slug: r.get(2)?,
                        description: r.get(3)?,
                    },
                ))
            },
        )
        .map_err(|_| AppError::NotFound)?;

    let page = fetch_post_page(&conn, PostFilter::Group(&group_id), query.number())?;

    Ok(Html(GroupTemplate {
        group,
        page,
        username: user.map(|u| u.username),
    }))
}

/// One author's posts, plus whether the current viewer follows them.
pub async fn profile(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Html<ProfileTemplate>> {
    let conn = state.db.get()?;

    let (author_id, author): (String, String) = conn
        .query_row(
            "SELECT id, username FROM users WHERE username = ?1",
            params![username],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .map_err(|_| AppError::NotFound)?;

    let (following, is_self) = match &user {
        Some(viewer) => {
            let following: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = ?1 AND followed_id = ?2)",
                params![viewer.id, author_id],
                |r| r.get(0),
            )?;
            (following, viewer.id == author_id)
        }
        None => (false, false),
    };

    let post_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM posts WHERE author_id = ?1",
        params![author_id],
        |r| r.get(0),
    )?;

    let page = fetch_post_page(&conn, PostFilter::Author(&author_id), query.number())?;

    Ok(Html(ProfileTemplate {
        author,
        post_count,
        following,
        is_self,
        page,
        username: user.map(|u| u.username),
    }))
}

/// Posts by everyone the current viewer follows. Empty is fine.
pub async fn follow_index(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<PageQuery>,
) -> AppResult<Html<FollowTemplate>> {
    let conn = state.db.get()?;
    let page = fetch_post_page(&conn, PostFilter::FollowedBy(&user.id), query.number())?;

    Ok(Html(FollowTemplate {
        page,
        username: Some(user.username),
    }))
}

// --- Query helpers ---

pub(crate) enum PostFilter<'a> {
    All,
    Group(&'a str),
    Author(&'a str),
    FollowedBy(&'a str),
}

/// One page of posts under `filter`, newest first.
pub(crate) fn fetch_post_page(
    conn: &rusqlite::Connection,
    filter: PostFilter<'_>,
    requested: Option<i64>,
) -> Result<Page<PostCard>, AppError> {
    let (where_sql, bind): (&str, Option<&str>) = match filter {
        PostFilter::All => ("", None),
        PostFilter::Group(id) => ("WHERE p.group_id = :f", Some(id)),
        PostFilter::Author(id) => ("WHERE p.author_id = :f", Some(id)),
        PostFilter::FollowedBy(id) => (
            "WHERE p.author_id IN (SELECT followed_id FROM follows WHERE follower_id = :f)",
            Some(id),
        ),
    };

    let count_sql = format!("SELECT COUNT(*) FROM posts p {}", where_sql);
    let total: i64 = {
        let mut named: Vec<(&str, &dyn ToSql)> = Vec::new();
        if let Some(ref f) = bind {
            named.push((":f", f));
        }
        conn.query_row(&count_sql, named.as_slice(), |r| r.get(0))?
    };

    let bounds = page_bounds(total, requested);

    let select_sql = format!(
        "SELECT p.id, u.username, p.text, p.image_path, p.created_at, g.title, g.slug,
                (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id)
         FROM posts p
         LEFT JOIN users u ON u.id = p.author_id
         LEFT JOIN groups g ON g.id = p.group_id
         {}
         ORDER BY p.created_at DESC, p.id DESC
         LIMIT :limit OFFSET :offset",
        where_sql
    );

    let mut stmt = conn.prepare(&select_sql)?;
    let mut named: Vec<(&str, &dyn ToSql)> =
        vec![(":limit", &bounds.limit), (":offset", &bounds.offset)];
    if let Some(ref f) = bind {
        named.push((":f", f));
    }

    let items = stmt
        .query_map(named.as_slice(), |row| {
            let created_at_raw: String = row.get(4)?;
            let group_title: Option<String> = row.get(5)?;
            let group_slug: Option<String> = row.get(6)?;
            Ok(PostCard {
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
            })
        })?
        .filter_map(|r| r.ok())
        .collect();

    Ok(Page::new(items, bounds))
}

// --- Time formatting ---

pub(crate) fn parse_and_format_time(db_time: &str) -> String {
    NaiveDateTime::parse_from_str(db_time, "%Y-%m-%d %H:%M:%S")
        .map(|dt| format_relative_time(&dt))
        .unwrap_or_else(|_| db_time.to_string())
}

pub(crate) fn format_relative_time(dt: &NaiveDateTime) -> String {
    let now = Utc::now().naive_utc();
    let diff = now.signed_duration_since(*dt);

    let seconds = diff.num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }

    let minutes = diff.num_minutes();
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }

    let hours = diff.num_hours();
    if hours < 24 {
        return format!("{}h ago", hours);
    }

    let days = diff.num_days();
    if days < 7 {
        return format!("{}d ago", days);
    }

    dt.format("%b %-d, %Y").to_string()
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::state::DbPool;
    use chrono::NaiveDate;
    use r2d2::Pool;
    use r2d2_sqlite::SqliteConnectionManager;

    fn test_pool() -> DbPool {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).unwrap();
        {
            let conn = pool.get().unwrap();
            conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        }
        db::run_migrations(&pool).unwrap();
        pool
    }

    fn seed_user(pool: &DbPool, id: &str, username: &str) {
        pool.get()
            .unwrap()
            .execute(
                "INSERT INTO users (id, username, password_hash) VALUES (?1, ?2, 'x')",
                params![id, username],
            )
            .unwrap();
    }

    fn seed_post(pool: &DbPool, id: &str, author: &str, group: Option<&str>, created: &str) {
        pool.get()
            .unwrap()
            .execute(
                "INSERT INTO posts (id, author_id, group_id, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, author, group, format!("text of {}", id), created],
            )
            .unwrap();
    }

    #[test]
    fn global_feed_is_newest_first() {
        let pool = test_pool();
        seed_user(&pool, "u1", "alice");
        seed_post(&pool, "p1", "u1", None, "2024-01-01 10:00:00");
        seed_post(&pool, "p2", "u1", None, "2024-01-02 10:00:00");
        seed_post(&pool, "p3", "u1", None, "2024-01-03 10:00:00");

        let conn = pool.get().unwrap();
        let page = fetch_post_page(&conn, PostFilter::All, None).unwrap();
        let ids: Vec<&str> = page.items.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p3", "p2", "p1"]);
    }

    #[test]
    fn fifteen_posts_paginate_ten_then_five() {
        let pool = test_pool();
        seed_user(&pool, "u1", "alice");
        for i in 0..15 {
            seed_post(
                &pool,
                &format!("p{:02}", i),
                "u1",
                None,
                &format!("2024-01-01 10:00:{:02}", i),
            );
        }

        let conn = pool.get().unwrap();
        let first = fetch_post_page(&conn, PostFilter::All, Some(1)).unwrap();
        assert_eq!(first.items.len(), 10);
        assert_eq!(first.total_pages, 2);
        assert!(first.has_next());

        let second = fetch_post_page(&conn, PostFilter::All, Some(2)).unwrap();
        assert_eq!(second.items.len(), 5);
        assert!(!second.has_next());
        assert!(second.has_previous());

        // No overlap between pages
        let newest_on_second = &second.items[0];
        assert!(first.items.iter().all(|p| p.id != newest_on_second.id));
    }

    #[test]
    fn out_of_range_page_clamps_to_last() {
        let pool = test_pool();
        seed_user(&pool, "u1", "alice");
        for i in 0..15 {
            seed_post(
                &pool,
                &format!("p{:02}", i),
                "u1",
                None,
                &format!("2024-01-01 10:00:{:02}", i),
            );
        }

        let conn = pool.get().unwrap();
        let page = fetch_post_page(&conn, PostFilter::All, Some(99)).unwrap();
        assert_eq!(page.number, 2);
        assert_eq!(page.items.len(), 5);
    }

    #[test]
    fn group_filter_only_returns_that_group() {
        let pool = test_pool();
        seed_user(&pool, "u1", "alice");
        pool.get()
            .unwrap()
            .execute(
                "INSERT INTO groups (id, title, slug) VALUES ('g1', 'Cats', 'cats')",
                [],
            )
            .unwrap();
        seed_post(&pool, "p1", "u1", Some("g1"), "2024-01-01 10:00:00");
        seed_post(&pool, "p2", "u1", None, "2024-01-02 10:00:00");

        let conn = pool.get().unwrap();
        let page = fetch_post_page(&conn, PostFilter::Group("g1"), None).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, "p1");
        assert_eq!(page.items[0].group.as_ref().unwrap().slug, "cats");
    }

    #[test]
    fn author_filter_only_returns_that_author() {
        let pool = test_pool();
        seed_user(&pool, "u1", "alice");
        seed_user(&pool, "u2", "bob");
        seed_post(&pool, "p1", "u1", None, "2024-01-01 10:00:00");
        seed_post(&pool, "p2", "u2", None, "2024-01-02 10:00:00");

        let conn = pool.get().unwrap();
        let page = fetch_post_page(&conn, PostFilter::Author("u2"), None).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].author.as_deref(), Some("bob"));
    }

    #[test]
    fn follow_filter_returns_followed_authors_only() {
        let pool = test_pool();
        seed_user(&pool, "u1", "alice");
        seed_user(&pool, "u2", "bob");
        seed_user(&pool, "u3", "carol");
        pool.get()
            .unwrap()
            .execute(
                "INSERT INTO follows (id, follower_id, followed_id) VALUES ('f1', 'u1', 'u2')",
                [],
            )
            .unwrap();
        seed_post(&pool, "p1", "u2", None, "2024-01-01 10:00:00");
        seed_post(&pool, "p2", "u3", None, "2024-01-02 10:00:00");

        let conn = pool.get().unwrap();
        let page = fetch_post_page(&conn, PostFilter::FollowedBy("u1"), None).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, "p1");
    }

    #[test]
    fn follow_filter_with_no_edges_is_empty_not_an_error() {
        let pool = test_pool();
        seed_user(&pool, "u1", "alice");

        let conn = pool.get().unwrap();
        let page = fetch_post_page(&conn, PostFilter::FollowedBy("u1"), None).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn format_relative_time_just_now() {
        let now = Utc::now().naive_utc();
        assert_eq!(format_relative_time(&now), "just now");
    }

    #[test]
    fn format_relative_time_minutes() {
        let dt = Utc::now().naive_utc() - chrono::Duration::minutes(5);
        assert_eq!(format_relative_time(&dt), "5m ago");
    }

    #[test]
    fn format_relative_time_old_date() {
        let dt = NaiveDate::from_ymd_opt(2025, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(format_relative_time(&dt), "Jan 15, 2025");
    }

    #[test]
    fn parse_and_format_bad_input_returns_raw() {
        assert_eq!(parse_and_format_time("not-a-date"), "not-a-date");
    }
}
