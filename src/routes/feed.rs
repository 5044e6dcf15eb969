use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::models::SquadId;
use crate::error::AppResult;
use crate::extractors::MaybeUser;
use crate::feed::{FeedPage, SortMode};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FeedParams {
    pub sort: Option<String>,
    pub squad: Option<i64>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/feed", get(feed_page))
}

async fn feed_page(
    State(state): State<AppState>,
    user: MaybeUser,
    Query(params): Query<FeedParams>,
) -> AppResult<Json<FeedPage>> {
    let sort = match params.sort.as_deref() {
        Some(raw) => raw.parse::<SortMode>()?,
        None => SortMode::default(),
    };
    let scope = params.squad.map(SquadId);
    let page = params.page.unwrap_or(1);
    let page_size = params
        .page_size
        .unwrap_or(state.config.feed.default_page_size);

    let spec = state.planner.resolve(sort, scope, user.id()).await?;
    let feed = state
        .planner
        .fetch_page(&spec, page, page_size, user.id())
        .await?;

    Ok(Json(feed))
}
