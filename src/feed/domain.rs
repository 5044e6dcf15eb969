// Feed query types - pure, no side effects
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::models::{PostId, SquadId, UserId};
use crate::error::FeedError;
use crate::interactions::domain::{BookmarkState, InteractionState, VoteState};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    New,
    Top,
    Trending,
    #[serde(alias = "personalized")]
    Following,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Top => "top",
            Self::Trending => "trending",
            Self::Following => "following",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SortMode {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(Self::New),
            "top" => Ok(Self::Top),
            "trending" => Ok(Self::Trending),
            "following" | "personalized" => Ok(Self::Following),
            other => Err(FeedError::UnknownSortMode(other.to_string())),
        }
    }
}

/// Columns the planner is allowed to order by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortColumn {
    CreatedAt,
    Upvotes,
    CommentCount,
    Id,
}

impl SortColumn {
    pub fn column_name(&self) -> &'static str {
        match self {
            Self::CreatedAt => "p.created_at",
            Self::Upvotes => "p.upvotes",
            Self::CommentCount => "p.comment_count",
            Self::Id => "p.id",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderBy {
    pub column: SortColumn,
    pub direction: Direction,
}

impl OrderBy {
    pub fn desc(column: SortColumn) -> Self {
        Self {
            column,
            direction: Direction::Desc,
        }
    }
}

/// Conjunctive row filters on the content table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    SquadEq(SquadId),
    SquadIn(Vec<SquadId>),
    Visible,
}

/// Concrete filter and ordering derived from a sort mode and scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    pub filters: Vec<Filter>,
    pub order: Vec<OrderBy>,
}

impl FilterSpec {
    /// Build the filters and ordering for a sort mode.
    ///
    /// `memberships` is `None` for an anonymous viewer. `Following` with no
    /// memberships falls back to the trending ordering, never to an empty set.
    pub fn resolve(
        sort: SortMode,
        scope: Option<SquadId>,
        memberships: Option<&[SquadId]>,
    ) -> Self {
        let mut filters = vec![Filter::Visible];
        let mut order = match sort {
            SortMode::New => vec![OrderBy::desc(SortColumn::CreatedAt)],
            SortMode::Top => vec![OrderBy::desc(SortColumn::Upvotes)],
            SortMode::Trending => trending_order(),
            SortMode::Following => match memberships {
                Some(squads) if !squads.is_empty() => {
                    filters.push(Filter::SquadIn(squads.to_vec()));
                    vec![OrderBy::desc(SortColumn::CreatedAt)]
                }
                _ => trending_order(),
            },
        };

        if let Some(squad) = scope {
            filters.push(Filter::SquadEq(squad));
        }

        // Stable offset pagination needs a total order.
        order.push(OrderBy::desc(SortColumn::Id));

        Self { filters, order }
    }

    pub fn scope(&self) -> Option<SquadId> {
        self.filters.iter().find_map(|f| match f {
            Filter::SquadEq(id) => Some(*id),
            _ => None,
        })
    }
}

fn trending_order() -> Vec<OrderBy> {
    vec![
        OrderBy::desc(SortColumn::Upvotes),
        OrderBy::desc(SortColumn::CommentCount),
    ]
}

/// Offset window over the ordered content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u32,
    pub page_size: u32,
}

impl PageWindow {
    pub fn new(page: u32, page_size: u32) -> Result<Self, FeedError> {
        if page == 0 || page_size == 0 {
            return Err(FeedError::InvalidPage { page, page_size });
        }
        Ok(Self { page, page_size })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u32 {
        self.page_size
    }
}

/// A content query as handed to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentQuery {
    pub spec: FilterSpec,
    pub window: PageWindow,
}

/// Post joined with author and squad display fields, plus the viewer's
/// own interaction flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPost {
    pub id: PostId,
    pub title: String,
    pub body: String,
    pub image_url: Option<String>,
    pub author_id: UserId,
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub squad_id: Option<SquadId>,
    pub squad_name: Option<String>,
    pub upvotes: u32,
    pub downvotes: u32,
    pub comment_count: u32,
    pub is_boosted: bool,
    pub created_at: DateTime<Utc>,
    pub viewer_vote: VoteState,
    pub viewer_bookmarked: bool,
}

impl FeedPost {
    pub fn score(&self) -> i64 {
        i64::from(self.upvotes) - i64::from(self.downvotes)
    }

    pub fn interaction(&self) -> InteractionState {
        InteractionState {
            vote: self.viewer_vote,
            upvotes: self.upvotes,
            downvotes: self.downvotes,
            bookmark: BookmarkState::from_flag(self.viewer_bookmarked),
        }
    }

    pub fn apply_interaction(&mut self, state: &InteractionState) {
        self.viewer_vote = state.vote;
        self.upvotes = state.upvotes;
        self.downvotes = state.downvotes;
        self.viewer_bookmarked = state.bookmark.is_present();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPage {
    pub posts: Vec<FeedPost>,
    pub page: u32,
    pub has_more: bool,
}

impl FeedPage {
    /// `has_more` is an approximation: a full page always reports more,
    /// even when no further row exists.
    pub fn from_rows(posts: Vec<FeedPost>, window: PageWindow) -> Self {
        let has_more = posts.len() == window.page_size as usize;
        Self {
            posts,
            page: window.page,
            has_more,
        }
    }
}
