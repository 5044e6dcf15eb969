// SQLite implementation of the content contract
use async_trait::async_trait;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::backend::{BackendError, ContentBackend};
use crate::db::models::{parse_timestamp, PostId, SquadId, UserId};
use crate::feed::domain::{ContentQuery, FeedPost, Filter};
use crate::interactions::domain::{
    BookmarkState, CounterDelta, InteractionState, VoteChange, VoteClick, VoteState, VoteWrite,
};
use crate::state::DbPool;

const FEED_COLUMNS: &str = "p.id, p.title, p.body, p.image_url, p.author_id,
        a.display_name, a.avatar_url, p.squad_id, s.name,
        p.upvotes, p.downvotes, p.comment_count, p.is_boosted, p.created_at,
        v.is_upvote, b.post_id IS NOT NULL";

pub struct SqliteBackend {
    pool: DbPool,
}

impl SqliteBackend {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Read the stored vote, apply the click and persist the result in one
    /// transaction. Returns the viewer's resulting interaction state.
    pub fn click_vote(
        &self,
        user: &UserId,
        post: PostId,
        click: VoteClick,
    ) -> Result<InteractionState, BackendError> {
        let conn = self.pool.get()?;

        in_transaction(&conn, |conn| {
            let before = read_interaction(conn, user, post)?;
            let transition = before.vote.click(click);
            if let Some(change) = transition.change() {
                write_vote(conn, user, post, &change.write)?;
                write_counters(conn, post, change.delta)?;
            }
            tracing::debug!(
                "Vote on post {} by {}: {} -> {}",
                post,
                user,
                transition.from,
                transition.to
            );
            read_interaction(conn, user, post)
        })
    }

    /// Flip the viewer's bookmark on a post. Returns whether it is now set.
    pub fn toggle_bookmark(&self, user: &UserId, post: PostId) -> Result<bool, BackendError> {
        let conn = self.pool.get()?;

        in_transaction(&conn, |conn| {
            let current = read_interaction(conn, user, post)?;
            if current.bookmark.is_present() {
                remove_bookmark(conn, user, post)?;
            } else {
                add_bookmark(conn, user, post)?;
            }
            Ok(!current.bookmark.is_present())
        })
    }
}

#[async_trait]
impl ContentBackend for SqliteBackend {
    async fn query_content(
        &self,
        query: &ContentQuery,
        viewer: Option<&UserId>,
    ) -> Result<Vec<FeedPost>, BackendError> {
        let conn = self.pool.get()?;

        let viewer_value = viewer
            .map(|v| Value::Text(v.as_str().to_string()))
            .unwrap_or(Value::Null);
        let mut values = vec![viewer_value.clone(), viewer_value];

        let mut clauses = Vec::with_capacity(query.spec.filters.len());
        for filter in &query.spec.filters {
            match filter {
                Filter::Visible => clauses.push("p.is_hidden = 0".to_string()),
                Filter::SquadEq(squad) => {
                    clauses.push("p.squad_id = ?".to_string());
                    values.push(Value::Integer(squad.0));
                }
                Filter::SquadIn(squads) if squads.is_empty() => clauses.push("0".to_string()),
                Filter::SquadIn(squads) => {
                    let marks = vec!["?"; squads.len()].join(", ");
                    clauses.push(format!("p.squad_id IN ({})", marks));
                    values.extend(squads.iter().map(|s| Value::Integer(s.0)));
                }
            }
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let order_clause = query
            .spec
            .order
            .iter()
            .map(|o| format!("{} {}", o.column.column_name(), o.direction.keyword()))
            .collect::<Vec<_>>()
            .join(", ");

        values.push(Value::Integer(i64::from(query.window.limit())));
        values.push(Value::Integer(query.window.offset() as i64));

        let sql = format!(
            "SELECT {FEED_COLUMNS}
             FROM posts p
             JOIN profiles a ON a.id = p.author_id
             LEFT JOIN squads s ON s.id = p.squad_id
             LEFT JOIN votes v ON v.post_id = p.id AND v.user_id = ?
             LEFT JOIN bookmarks b ON b.post_id = p.id AND b.user_id = ?
             {where_clause}
             ORDER BY {order_clause}
             LIMIT ? OFFSET ?"
        );

        let mut stmt = conn.prepare(&sql)?;
        let posts = stmt
            .query_map(params_from_iter(values), feed_post_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            "Fetched {} posts (offset {}, limit {})",
            posts.len(),
            query.window.offset(),
            query.window.limit()
        );

        Ok(posts)
    }

    async fn memberships(&self, user: &UserId) -> Result<Vec<SquadId>, BackendError> {
        let conn = self.pool.get()?;

        let mut stmt =
            conn.prepare("SELECT squad_id FROM squad_members WHERE user_id = ?1 ORDER BY squad_id")?;
        let squads = stmt
            .query_map(params![user.as_str()], |row| Ok(SquadId(row.get(0)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(squads)
    }

    async fn insert_vote(
        &self,
        user: &UserId,
        post: PostId,
        is_upvote: bool,
    ) -> Result<(), BackendError> {
        let conn = self.pool.get()?;
        write_vote(&conn, user, post, &VoteWrite::Insert { is_upvote })
    }

    async fn update_vote(
        &self,
        user: &UserId,
        post: PostId,
        is_upvote: bool,
    ) -> Result<(), BackendError> {
        let conn = self.pool.get()?;
        write_vote(&conn, user, post, &VoteWrite::Update { is_upvote })
    }

    async fn delete_vote(&self, user: &UserId, post: PostId) -> Result<(), BackendError> {
        let conn = self.pool.get()?;
        write_vote(&conn, user, post, &VoteWrite::Delete)
    }

    async fn adjust_post_counters(
        &self,
        post: PostId,
        delta: CounterDelta,
    ) -> Result<(), BackendError> {
        let conn = self.pool.get()?;
        write_counters(&conn, post, delta)
    }

    async fn apply_vote_change(
        &self,
        user: &UserId,
        post: PostId,
        change: &VoteChange,
    ) -> Result<(), BackendError> {
        let conn = self.pool.get()?;

        in_transaction(&conn, |conn| {
            write_vote(conn, user, post, &change.write)?;
            write_counters(conn, post, change.delta)
        })
    }

    async fn insert_bookmark(&self, user: &UserId, post: PostId) -> Result<(), BackendError> {
        let conn = self.pool.get()?;
        add_bookmark(&conn, user, post)
    }

    async fn delete_bookmark(&self, user: &UserId, post: PostId) -> Result<(), BackendError> {
        let conn = self.pool.get()?;
        remove_bookmark(&conn, user, post)
    }
}

/// Run `f` inside `BEGIN IMMEDIATE`, committing on success and rolling back
/// on any error.
fn in_transaction<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T, BackendError>,
) -> Result<T, BackendError> {
    conn.execute("BEGIN IMMEDIATE", [])?;

    match f(conn) {
        Ok(value) => match conn.execute("COMMIT", []) {
            Ok(_) => Ok(value),
            Err(e) => {
                // A failed COMMIT can leave the transaction open on a pooled connection
                if let Err(rollback) = conn.execute("ROLLBACK", []) {
                    tracing::warn!("Rollback after failed commit also failed: {}", rollback);
                }
                Err(e.into())
            }
        },
        Err(e) => {
            conn.execute("ROLLBACK", [])?;
            Err(e)
        }
    }
}

fn feed_post_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FeedPost> {
    let created_at: String = row.get(13)?;
    let created_at = parse_timestamp(&created_at).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            13,
            Type::Text,
            format!("invalid timestamp: {}", created_at).into(),
        )
    })?;

    Ok(FeedPost {
        id: PostId(row.get(0)?),
        title: row.get(1)?,
        body: row.get(2)?,
        image_url: row.get(3)?,
        author_id: UserId(row.get(4)?),
        author_name: row.get(5)?,
        author_avatar: row.get(6)?,
        squad_id: row.get::<_, Option<i64>>(7)?.map(SquadId),
        squad_name: row.get(8)?,
        upvotes: row.get(9)?,
        downvotes: row.get(10)?,
        comment_count: row.get(11)?,
        is_boosted: row.get(12)?,
        created_at,
        viewer_vote: VoteState::from_direction(row.get(14)?),
        viewer_bookmarked: row.get(15)?,
    })
}

fn read_interaction(
    conn: &Connection,
    user: &UserId,
    post: PostId,
) -> Result<InteractionState, BackendError> {
    let counters: Option<(u32, u32)> = conn
        .query_row(
            "SELECT upvotes, downvotes FROM posts WHERE id = ?1 AND is_hidden = 0",
            params![post.0],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let (upvotes, downvotes) =
        counters.ok_or_else(|| BackendError::NotFound(format!("post {}", post)))?;

    let direction: Option<bool> = conn
        .query_row(
            "SELECT is_upvote FROM votes WHERE user_id = ?1 AND post_id = ?2",
            params![user.as_str(), post.0],
            |row| row.get(0),
        )
        .optional()?;

    let bookmarked: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM bookmarks WHERE user_id = ?1 AND post_id = ?2",
        params![user.as_str(), post.0],
        |row| row.get(0),
    )?;

    Ok(InteractionState {
        vote: VoteState::from_direction(direction),
        upvotes,
        downvotes,
        bookmark: BookmarkState::from_flag(bookmarked),
    })
}

fn write_vote(
    conn: &Connection,
    user: &UserId,
    post: PostId,
    write: &VoteWrite,
) -> Result<(), BackendError> {
    if !matches!(write, VoteWrite::Delete) {
        ensure_visible(conn, post)?;
    }

    let rows = match write {
        VoteWrite::Insert { is_upvote } => conn
            .execute(
                "INSERT INTO votes (user_id, post_id, is_upvote) VALUES (?1, ?2, ?3)",
                params![user.as_str(), post.0, is_upvote],
            )
            .map_err(|e| constraint_to_conflict(e, "vote already exists"))?,
        VoteWrite::Update { is_upvote } => conn.execute(
            "UPDATE votes SET is_upvote = ?3 WHERE user_id = ?1 AND post_id = ?2",
            params![user.as_str(), post.0, is_upvote],
        )?,
        VoteWrite::Delete => conn.execute(
            "DELETE FROM votes WHERE user_id = ?1 AND post_id = ?2",
            params![user.as_str(), post.0],
        )?,
    };

    if rows == 0 {
        return Err(BackendError::NotFound(format!(
            "vote by {} on post {}",
            user, post
        )));
    }
    Ok(())
}

fn write_counters(conn: &Connection, post: PostId, delta: CounterDelta) -> Result<(), BackendError> {
    let rows = conn
        .execute(
            "UPDATE posts SET upvotes = upvotes + ?1, downvotes = downvotes + ?2
             WHERE id = ?3 AND is_hidden = 0",
            params![delta.upvotes, delta.downvotes, post.0],
        )
        .map_err(|e| constraint_to_conflict(e, "counter would go negative"))?;

    if rows == 0 {
        return Err(BackendError::NotFound(format!("post {}", post)));
    }
    Ok(())
}

fn add_bookmark(conn: &Connection, user: &UserId, post: PostId) -> Result<(), BackendError> {
    ensure_visible(conn, post)?;
    conn.execute(
        "INSERT INTO bookmarks (user_id, post_id) VALUES (?1, ?2)",
        params![user.as_str(), post.0],
    )
    .map_err(|e| constraint_to_conflict(e, "bookmark rejected"))?;
    Ok(())
}

fn remove_bookmark(conn: &Connection, user: &UserId, post: PostId) -> Result<(), BackendError> {
    let rows = conn.execute(
        "DELETE FROM bookmarks WHERE user_id = ?1 AND post_id = ?2",
        params![user.as_str(), post.0],
    )?;
    if rows == 0 {
        return Err(BackendError::NotFound(format!(
            "bookmark by {} on post {}",
            user, post
        )));
    }
    Ok(())
}

/// Hidden posts accept no new votes, counter changes or bookmarks.
fn ensure_visible(conn: &Connection, post: PostId) -> Result<(), BackendError> {
    let visible: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1 AND is_hidden = 0",
        params![post.0],
        |row| row.get(0),
    )?;
    if visible {
        Ok(())
    } else {
        Err(BackendError::NotFound(format!("post {}", post)))
    }
}

fn constraint_to_conflict(err: rusqlite::Error, what: &str) -> BackendError {
    match err.sqlite_error_code() {
        Some(rusqlite::ErrorCode::ConstraintViolation) => {
            BackendError::Conflict(format!("{}: {}", what, err))
        }
        _ => BackendError::Sql(err),
    }
}
