use std::sync::Arc;
use tokio::sync::Mutex;

use crate::backend::ContentBackend;
use crate::db::models::{SquadId, UserId};
use crate::error::FeedError;
use crate::feed::planner::FeedPlanner;
use crate::feed::session::{FeedSession, FetchTicket, PageApplied};
use crate::feed::domain::{FeedPost, FilterSpec, SortMode};

/// Async driver for one feed instance.
///
/// The session lock is only held to issue a ticket and to apply a result,
/// so a sort change can supersede a fetch that is still awaiting the backend.
pub struct FeedController<B: ?Sized> {
    planner: Arc<FeedPlanner<B>>,
    session: Arc<Mutex<FeedSession>>,
    viewer: Option<UserId>,
}

impl<B: ?Sized> Clone for FeedController<B> {
    fn clone(&self) -> Self {
        Self {
            planner: Arc::clone(&self.planner),
            session: Arc::clone(&self.session),
            viewer: self.viewer.clone(),
        }
    }
}

impl<B: ContentBackend + ?Sized> FeedController<B> {
    pub fn new(planner: Arc<FeedPlanner<B>>, session: FeedSession, viewer: Option<UserId>) -> Self {
        Self {
            planner,
            session: Arc::new(Mutex::new(session)),
            viewer,
        }
    }

    pub fn session(&self) -> &Arc<Mutex<FeedSession>> {
        &self.session
    }

    pub async fn posts(&self) -> Vec<FeedPost> {
        self.session.lock().await.posts().to_vec()
    }

    /// Change sort mode and load its first page.
    pub async fn set_sort(&self, sort: SortMode) -> Result<Option<PageApplied>, FeedError> {
        let ticket = {
            let mut session = self.session.lock().await;
            session.set_sort(sort);
            session.begin_refresh()
        };
        self.run(ticket, None).await
    }

    /// Change squad scope and load its first page.
    pub async fn set_scope(
        &self,
        scope: Option<SquadId>,
    ) -> Result<Option<PageApplied>, FeedError> {
        let ticket = {
            let mut session = self.session.lock().await;
            session.set_scope(scope);
            session.begin_refresh()
        };
        self.run(ticket, None).await
    }

    /// Reload page 1 of the current query. Filters are resolved afresh.
    pub async fn refresh(&self) -> Result<Option<PageApplied>, FeedError> {
        let ticket = self.session.lock().await.begin_refresh();
        self.run(ticket, None).await
    }

    /// Load the next page with the filters page 1 was fetched with.
    /// `Ok(None)` when there is nothing more to load or the result was
    /// superseded.
    pub async fn load_more(&self) -> Result<Option<PageApplied>, FeedError> {
        let (ticket, spec) = {
            let mut session = self.session.lock().await;
            match session.begin_load_more() {
                Some(ticket) => (ticket, session.spec().cloned()),
                None => return Ok(None),
            }
        };
        self.run(ticket, spec).await
    }

    async fn run(
        &self,
        ticket: FetchTicket,
        pinned: Option<FilterSpec>,
    ) -> Result<Option<PageApplied>, FeedError> {
        let viewer = self.viewer.as_ref();
        let spec = match pinned {
            Some(spec) => Ok(spec),
            None => self.planner.resolve(ticket.sort, ticket.scope, viewer).await,
        };
        let result = match &spec {
            Ok(spec) => {
                self.planner
                    .fetch_page(spec, ticket.page, ticket.page_size, viewer)
                    .await
            }
            Err(e) => Err(e.clone()),
        };

        let mut session = self.session.lock().await;
        match session.complete(ticket, result) {
            Ok(applied) => {
                if let Ok(spec) = spec {
                    session.pin_spec(ticket, spec);
                }
                tracing::debug!(
                    "Applied {} page {}: {} posts, has_more={}",
                    ticket.sort,
                    applied.page,
                    applied.received,
                    applied.has_more
                );
                Ok(Some(applied))
            }
            Err(FeedError::StaleResponseDiscarded { issued, latest }) => {
                tracing::debug!("Discarded stale feed response {} (latest {})", issued, latest);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
