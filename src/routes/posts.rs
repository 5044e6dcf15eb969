use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::models::PostId;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::interactions::{VoteClick, VoteState};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub click: VoteClick,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoteResponse {
    pub vote: VoteState,
    pub upvotes: u32,
    pub downvotes: u32,
    pub score: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookmarkResponse {
    pub bookmarked: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/posts/{id}/vote", post(vote))
        .route("/api/posts/{id}/bookmark", post(toggle_bookmark))
}

async fn vote(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<i64>,
    Json(request): Json<VoteRequest>,
) -> AppResult<Json<VoteResponse>> {
    let result = state
        .backend
        .click_vote(&user.id, PostId(post_id), request.click)?;

    Ok(Json(VoteResponse {
        vote: result.vote,
        upvotes: result.upvotes,
        downvotes: result.downvotes,
        score: result.score(),
    }))
}

async fn toggle_bookmark(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<i64>,
) -> AppResult<Json<BookmarkResponse>> {
    let bookmarked = state.backend.toggle_bookmark(&user.id, PostId(post_id))?;
    Ok(Json(BookmarkResponse { bookmarked }))
}
