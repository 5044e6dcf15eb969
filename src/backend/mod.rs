//! Contract between the feed core and the hosted content store.
//!
//! The planner and reconciler only ever talk to a [`ContentBackend`]; the
//! SQLite implementation in [`sqlite`] is what the server wires up, and tests
//! wrap it to inject failures and delays.

pub mod sqlite;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::db::models::{PostId, SquadId, UserId};
use crate::feed::domain::{ContentQuery, FeedPost};
use crate::interactions::domain::{CounterDelta, VoteChange, VoteWrite};

pub use sqlite::SqliteBackend;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Database error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Whether the same call may succeed if issued again. Missing rows and
    /// constraint violations are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Pool(_) | Self::Unavailable(_) => true,
            Self::Sql(e) => matches!(
                e.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
            ),
            Self::NotFound(_) | Self::Conflict(_) => false,
        }
    }
}

#[async_trait]
pub trait ContentBackend: Send + Sync {
    /// Filtered, ordered, offset-paginated posts joined with display fields.
    async fn query_content(
        &self,
        query: &ContentQuery,
        viewer: Option<&UserId>,
    ) -> Result<Vec<FeedPost>, BackendError>;

    /// Squads the user has joined.
    async fn memberships(&self, user: &UserId) -> Result<Vec<SquadId>, BackendError>;

    async fn insert_vote(
        &self,
        user: &UserId,
        post: PostId,
        is_upvote: bool,
    ) -> Result<(), BackendError>;

    async fn update_vote(
        &self,
        user: &UserId,
        post: PostId,
        is_upvote: bool,
    ) -> Result<(), BackendError>;

    async fn delete_vote(&self, user: &UserId, post: PostId) -> Result<(), BackendError>;

    async fn adjust_post_counters(
        &self,
        post: PostId,
        delta: CounterDelta,
    ) -> Result<(), BackendError>;

    /// Persist a vote row change together with its counter adjustment.
    ///
    /// The default issues the two calls in sequence and can leave them
    /// diverged if the second fails. Stores with transactions override it.
    async fn apply_vote_change(
        &self,
        user: &UserId,
        post: PostId,
        change: &VoteChange,
    ) -> Result<(), BackendError> {
        match change.write {
            VoteWrite::Insert { is_upvote } => self.insert_vote(user, post, is_upvote).await?,
            VoteWrite::Update { is_upvote } => self.update_vote(user, post, is_upvote).await?,
            VoteWrite::Delete => self.delete_vote(user, post).await?,
        }
        self.adjust_post_counters(post, change.delta).await
    }

    async fn insert_bookmark(&self, user: &UserId, post: PostId) -> Result<(), BackendError>;

    async fn delete_bookmark(&self, user: &UserId, post: PostId) -> Result<(), BackendError>;
}

pub type DynContentBackend = Arc<dyn ContentBackend>;
