use serde::Serialize;

use crate::db::models::{PostId, SquadId};
use crate::error::FeedError;
use crate::feed::domain::{FeedPage, FeedPost, FilterSpec, SortMode};

/// Identifies one issued fetch. Only the most recently issued ticket of a
/// session may apply its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub seq: u64,
    pub sort: SortMode,
    pub scope: Option<SquadId>,
    pub page: u32,
    pub page_size: u32,
}

/// What a completed fetch did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageApplied {
    pub page: u32,
    pub received: usize,
    pub total: usize,
    pub has_more: bool,
}

/// Accumulated posts and paging state of a single feed instance.
#[derive(Debug, Clone)]
pub struct FeedSession {
    sort: SortMode,
    scope: Option<SquadId>,
    page_size: u32,
    posts: Vec<FeedPost>,
    loaded_pages: u32,
    has_more: bool,
    latest_seq: u64,
    /// Filters the loaded pages were fetched with; later pages reuse them.
    spec: Option<FilterSpec>,
}

impl FeedSession {
    pub fn new(sort: SortMode, scope: Option<SquadId>, page_size: u32) -> Self {
        Self {
            sort,
            scope,
            page_size: page_size.max(1),
            posts: Vec::new(),
            loaded_pages: 0,
            has_more: true,
            latest_seq: 0,
            spec: None,
        }
    }

    pub fn sort(&self) -> SortMode {
        self.sort
    }

    pub fn scope(&self) -> Option<SquadId> {
        self.scope
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn posts(&self) -> &[FeedPost] {
        &self.posts
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn loaded_pages(&self) -> u32 {
        self.loaded_pages
    }

    /// Switch sort mode. Clears accumulated posts and invalidates in-flight
    /// fetches, even when the mode is unchanged.
    pub fn set_sort(&mut self, sort: SortMode) {
        self.sort = sort;
        self.reset();
    }

    /// Switch squad scope. Same reset rules as [`FeedSession::set_sort`].
    pub fn set_scope(&mut self, scope: Option<SquadId>) {
        self.scope = scope;
        self.reset();
    }

    /// Invalidate everything without changing the query. Used when the
    /// feed is navigated away from.
    pub fn reset(&mut self) {
        self.posts.clear();
        self.loaded_pages = 0;
        self.has_more = true;
        self.latest_seq += 1;
        self.spec = None;
    }

    /// Issue a fetch for page 1, superseding anything in flight.
    pub fn begin_refresh(&mut self) -> FetchTicket {
        self.issue(1)
    }

    /// Issue a fetch for the page after the last one applied, or `None`
    /// when the last page came back short.
    pub fn begin_load_more(&mut self) -> Option<FetchTicket> {
        if self.loaded_pages > 0 && !self.has_more {
            return None;
        }
        Some(self.issue(self.loaded_pages + 1))
    }

    fn issue(&mut self, page: u32) -> FetchTicket {
        self.latest_seq += 1;
        FetchTicket {
            seq: self.latest_seq,
            sort: self.sort,
            scope: self.scope,
            page,
            page_size: self.page_size,
        }
    }

    /// Apply the outcome of a fetch.
    ///
    /// Results for superseded tickets are dropped with
    /// [`FeedError::StaleResponseDiscarded`]. A failed fetch leaves the
    /// accumulated posts exactly as they were.
    pub fn complete(
        &mut self,
        ticket: FetchTicket,
        result: Result<FeedPage, FeedError>,
    ) -> Result<PageApplied, FeedError> {
        if ticket.seq != self.latest_seq {
            return Err(FeedError::StaleResponseDiscarded {
                issued: ticket.seq,
                latest: self.latest_seq,
            });
        }

        let page = result?;
        let received = page.posts.len();

        if ticket.page == 1 {
            self.posts = page.posts;
        } else {
            self.posts.extend(page.posts);
        }
        self.loaded_pages = ticket.page;
        self.has_more = page.has_more;

        Ok(PageApplied {
            page: ticket.page,
            received,
            total: self.posts.len(),
            has_more: self.has_more,
        })
    }

    /// Filters pinned by the last applied page, if any.
    pub fn spec(&self) -> Option<&FilterSpec> {
        self.spec.as_ref()
    }

    /// Pin the filters `ticket` was fetched with. Ignored for superseded
    /// tickets.
    pub fn pin_spec(&mut self, ticket: FetchTicket, spec: FilterSpec) {
        if ticket.seq == self.latest_seq {
            self.spec = Some(spec);
        }
    }

    /// Mutate a displayed post in place. Returns false if it is not loaded.
    pub fn patch_post(&mut self, id: PostId, f: impl FnOnce(&mut FeedPost)) -> bool {
        match self.posts.iter_mut().find(|p| p.id == id) {
            Some(post) => {
                f(post);
                true
            }
            None => false,
        }
    }
}
