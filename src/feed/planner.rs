use std::sync::Arc;

use crate::backend::ContentBackend;
use crate::db::models::{SquadId, UserId};
use crate::error::FeedError;
use crate::feed::domain::{ContentQuery, FeedPage, FilterSpec, PageWindow, SortMode};

/// Turns sort modes into concrete queries and runs them against a backend.
pub struct FeedPlanner<B: ?Sized> {
    backend: Arc<B>,
    max_page_size: u32,
}

impl<B: ContentBackend + ?Sized> FeedPlanner<B> {
    pub fn new(backend: Arc<B>, max_page_size: u32) -> Self {
        Self {
            backend,
            max_page_size: max_page_size.max(1),
        }
    }

    /// Resolve a sort mode and scope for the given viewer.
    ///
    /// Memberships are only looked up for `Following` with a signed-in viewer.
    pub async fn resolve(
        &self,
        sort: SortMode,
        scope: Option<SquadId>,
        viewer: Option<&UserId>,
    ) -> Result<FilterSpec, FeedError> {
        let memberships = match (sort, viewer) {
            (SortMode::Following, Some(user)) => Some(
                self.backend
                    .memberships(user)
                    .await
                    .map_err(FeedError::fetch)?,
            ),
            _ => None,
        };

        if sort == SortMode::Following && memberships.as_ref().map_or(true, |m| m.is_empty()) {
            tracing::debug!("No memberships for following feed, using trending order");
        }

        Ok(FilterSpec::resolve(sort, scope, memberships.as_deref()))
    }

    /// Fetch one page of `spec`. Page numbers start at 1.
    pub async fn fetch_page(
        &self,
        spec: &FilterSpec,
        page: u32,
        page_size: u32,
        viewer: Option<&UserId>,
    ) -> Result<FeedPage, FeedError> {
        let window = PageWindow::new(page, page_size.min(self.max_page_size))?;
        let query = ContentQuery {
            spec: spec.clone(),
            window,
        };

        let rows = self
            .backend
            .query_content(&query, viewer)
            .await
            .map_err(|e| {
                tracing::warn!("Feed page {} failed: {}", page, e);
                FeedError::fetch(e)
            })?;

        Ok(FeedPage::from_rows(rows, window))
    }
}
