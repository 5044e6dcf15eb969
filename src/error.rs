use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::backend::BackendError;
use crate::db::models::PostId;

/// Failures surfaced by the feed planner and the interaction reconciler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// A mutation was attempted without a signed-in actor.
    #[error("Sign in to vote or bookmark")]
    Unauthenticated,

    /// A page fetch failed; the previously displayed posts are untouched.
    #[error("Could not load feed: {message}")]
    TransientFetch { message: String, retryable: bool },

    /// A vote or bookmark write failed and local state was rolled back.
    #[error("Could not save change: {message}")]
    MutationPersist { message: String, retryable: bool },

    /// A fetch result arrived after a newer fetch was issued.
    #[error("Dropped stale response {issued} (latest is {latest})")]
    StaleResponseDiscarded { issued: u64, latest: u64 },

    #[error("Another change to post {post_id} is still being saved")]
    MutationPending { post_id: PostId },

    #[error("Post {0} is not loaded")]
    UnknownPost(PostId),

    #[error("Invalid page {page} with size {page_size}")]
    InvalidPage { page: u32, page_size: u32 },

    #[error("Unknown sort mode: {0}")]
    UnknownSortMode(String),
}

impl FeedError {
    pub fn fetch(err: BackendError) -> Self {
        Self::TransientFetch {
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }

    pub fn persist(err: BackendError) -> Self {
        Self::MutationPersist {
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }

    /// Whether the caller may offer a retry of the same action.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransientFetch { retryable, .. } | Self::MutationPersist { retryable, .. } => {
                *retryable
            }
            Self::MutationPending { .. } => true,
            Self::Unauthenticated
            | Self::StaleResponseDiscarded { .. }
            | Self::UnknownPost(_)
            | Self::InvalidPage { .. }
            | Self::UnknownSortMode(_) => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<FeedError> for AppError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::Unauthenticated => AppError::Unauthorized,
            FeedError::UnknownPost(_) => AppError::NotFound,
            FeedError::InvalidPage { .. } | FeedError::UnknownSortMode(_) => {
                AppError::BadRequest(err.to_string())
            }
            FeedError::TransientFetch {
                message,
                retryable: true,
            } => AppError::Backend(BackendError::Unavailable(message)),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Backend(BackendError::NotFound(what)) => {
                (StatusCode::NOT_FOUND, format!("Not found: {}", what))
            }
            AppError::Backend(BackendError::Conflict(what)) => {
                (StatusCode::CONFLICT, format!("Conflict: {}", what))
            }
            AppError::Backend(e) if !e.is_retryable() => {
                tracing::error!("Backend error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Backend(e) => {
                tracing::error!("Backend error: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Backend unavailable, try again".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, message).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
