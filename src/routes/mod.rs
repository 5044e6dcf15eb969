pub mod feed;
pub mod health;
pub mod posts;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Full application router with request tracing.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(feed::router())
        .merge(posts::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
