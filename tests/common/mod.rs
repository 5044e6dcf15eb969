#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rusqlite::params;
use squadfeed::backend::{BackendError, ContentBackend, SqliteBackend};
use squadfeed::db;
use squadfeed::db::models::{format_timestamp, PostId, SquadId, UserId};
use squadfeed::feed::domain::{ContentQuery, FeedPost};
use squadfeed::interactions::domain::CounterDelta;
use squadfeed::state::DbPool;
use tempfile::TempDir;

pub struct TestDb {
    pub pool: DbPool,
    _dir: TempDir,
}

/// Fresh migrated database with profiles `alice` and `bob`.
pub fn test_db() -> TestDb {
    let dir = TempDir::new().unwrap();
    let pool = db::create_pool(&dir.path().join("test.db")).expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");

    pool.get()
        .unwrap()
        .execute_batch(
            "INSERT INTO profiles (id, display_name) VALUES ('alice', 'Alice'), ('bob', 'Bob');",
        )
        .unwrap();

    TestDb { pool, _dir: dir }
}

impl TestDb {
    pub fn add_squad(&self, id: i64, name: &str) -> SquadId {
        self.pool
            .get()
            .unwrap()
            .execute(
                "INSERT INTO squads (id, name) VALUES (?1, ?2)",
                params![id, name],
            )
            .unwrap();
        SquadId(id)
    }

    pub fn join(&self, squad: SquadId, user: &str) {
        self.pool
            .get()
            .unwrap()
            .execute(
                "INSERT INTO squad_members (squad_id, user_id) VALUES (?1, ?2)",
                params![squad.0, user],
            )
            .unwrap();
    }

    pub fn add_post(&self, post: NewPost) -> PostId {
        let conn = self.pool.get().unwrap();
        conn.execute(
            "INSERT INTO posts (title, body, author_id, squad_id, upvotes, downvotes,
                                comment_count, is_hidden, created_at)
             VALUES (?1, 'body', 'alice', ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                post.title,
                post.squad.map(|s| s.0),
                post.upvotes,
                post.downvotes,
                post.comments,
                post.hidden,
                post.created_at,
            ],
        )
        .unwrap();
        PostId(conn.last_insert_rowid())
    }

    pub fn counters(&self, post: PostId) -> (u32, u32) {
        self.pool
            .get()
            .unwrap()
            .query_row(
                "SELECT upvotes, downvotes FROM posts WHERE id = ?1",
                params![post.0],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap()
    }

    pub fn vote_row(&self, user: &str, post: PostId) -> Option<bool> {
        self.pool
            .get()
            .unwrap()
            .query_row(
                "SELECT is_upvote FROM votes WHERE user_id = ?1 AND post_id = ?2",
                params![user, post.0],
                |r| r.get(0),
            )
            .ok()
    }
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub squad: Option<SquadId>,
    pub upvotes: u32,
    pub downvotes: u32,
    pub comments: u32,
    pub hidden: bool,
    pub created_at: String,
}

impl NewPost {
    pub fn new(title: &str, minute: u32) -> Self {
        Self {
            title: title.to_string(),
            squad: None,
            upvotes: 0,
            downvotes: 0,
            comments: 0,
            hidden: false,
            created_at: format_timestamp(
                Utc.with_ymd_and_hms(2026, 3, 1, 10, minute, 0).unwrap(),
            ),
        }
    }

    pub fn in_squad(mut self, squad: SquadId) -> Self {
        self.squad = Some(squad);
        self
    }

    pub fn votes(mut self, upvotes: u32, downvotes: u32) -> Self {
        self.upvotes = upvotes;
        self.downvotes = downvotes;
        self
    }

    pub fn comments(mut self, comments: u32) -> Self {
        self.comments = comments;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

pub fn user(id: &str) -> UserId {
    UserId::new(id)
}

/// Wraps the SQLite backend so tests can delay queries and refuse calls.
pub struct FlakyBackend {
    inner: SqliteBackend,
    pub fail_queries: AtomicBool,
    pub fail_writes: AtomicBool,
    pub fail_counters: AtomicBool,
    pub query_calls: AtomicUsize,
    delays: Mutex<VecDeque<Duration>>,
}

impl FlakyBackend {
    pub fn new(pool: DbPool) -> Self {
        Self {
            inner: SqliteBackend::new(pool),
            fail_queries: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_counters: AtomicBool::new(false),
            query_calls: AtomicUsize::new(0),
            delays: Mutex::new(VecDeque::new()),
        }
    }

    /// Delay the next `query_content` calls, one entry per call.
    pub fn delay_queries(&self, delays: impl IntoIterator<Item = Duration>) {
        self.delays.lock().unwrap().extend(delays);
    }

    fn check(&self, flag: &AtomicBool, what: &str) -> Result<(), BackendError> {
        if flag.load(Ordering::SeqCst) {
            Err(BackendError::Unavailable(format!("{} refused", what)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ContentBackend for FlakyBackend {
    async fn query_content(
        &self,
        query: &ContentQuery,
        viewer: Option<&UserId>,
    ) -> Result<Vec<FeedPost>, BackendError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check(&self.fail_queries, "query")?;
        self.inner.query_content(query, viewer).await
    }

    async fn memberships(&self, user: &UserId) -> Result<Vec<SquadId>, BackendError> {
        self.check(&self.fail_queries, "memberships")?;
        self.inner.memberships(user).await
    }

    async fn insert_vote(
        &self,
        user: &UserId,
        post: PostId,
        is_upvote: bool,
    ) -> Result<(), BackendError> {
        self.check(&self.fail_writes, "insert_vote")?;
        self.inner.insert_vote(user, post, is_upvote).await
    }

    async fn update_vote(
        &self,
        user: &UserId,
        post: PostId,
        is_upvote: bool,
    ) -> Result<(), BackendError> {
        self.check(&self.fail_writes, "update_vote")?;
        self.inner.update_vote(user, post, is_upvote).await
    }

    async fn delete_vote(&self, user: &UserId, post: PostId) -> Result<(), BackendError> {
        self.check(&self.fail_writes, "delete_vote")?;
        self.inner.delete_vote(user, post).await
    }

    async fn adjust_post_counters(
        &self,
        post: PostId,
        delta: CounterDelta,
    ) -> Result<(), BackendError> {
        self.check(&self.fail_counters, "adjust_post_counters")?;
        self.inner.adjust_post_counters(post, delta).await
    }

    async fn insert_bookmark(&self, user: &UserId, post: PostId) -> Result<(), BackendError> {
        self.check(&self.fail_writes, "insert_bookmark")?;
        self.inner.insert_bookmark(user, post).await
    }

    async fn delete_bookmark(&self, user: &UserId, post: PostId) -> Result<(), BackendError> {
        self.check(&self.fail_writes, "delete_bookmark")?;
        self.inner.delete_bookmark(user, post).await
    }
}
