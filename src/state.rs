use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::backend::SqliteBackend;
use crate::config::Config;
use crate::feed::FeedPlanner;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub backend: Arc<SqliteBackend>,
    pub planner: Arc<FeedPlanner<SqliteBackend>>,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        let backend = Arc::new(SqliteBackend::new(db));
        let planner = Arc::new(FeedPlanner::new(
            Arc::clone(&backend),
            config.feed.max_page_size,
        ));
        Self {
            config,
            backend,
            planner,
        }
    }
}
