// Interaction state machines - pure, no side effects
use serde::{Deserialize, Serialize};
use std::fmt;

/// A viewer's vote on a single post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteState {
    #[default]
    None,
    Up,
    Down,
}

impl VoteState {
    pub fn from_direction(is_upvote: Option<bool>) -> Self {
        match is_upvote {
            Some(true) => Self::Up,
            Some(false) => Self::Down,
            None => Self::None,
        }
    }

    pub fn as_direction(&self) -> Option<bool> {
        match self {
            Self::None => None,
            Self::Up => Some(true),
            Self::Down => Some(false),
        }
    }

    pub fn state_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    /// Resolve a click into the transition it causes.
    ///
    /// Clicking the active direction clears the vote, clicking the other
    /// direction flips it, and clicking from `None` casts it.
    pub fn click(self, click: VoteClick) -> VoteTransition {
        let to = match (self, click) {
            (Self::Up, VoteClick::Up) | (Self::Down, VoteClick::Down) => Self::None,
            (_, VoteClick::Up) => Self::Up,
            (_, VoteClick::Down) => Self::Down,
        };
        VoteTransition { from: self, to }
    }
}

impl fmt::Display for VoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.state_name())
    }
}

/// The button the viewer pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteClick {
    Up,
    Down,
}

/// Row-level write needed to persist a vote transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteWrite {
    Insert { is_upvote: bool },
    Update { is_upvote: bool },
    Delete,
}

/// Change applied to a post's stored counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDelta {
    pub upvotes: i64,
    pub downvotes: i64,
}

impl CounterDelta {
    pub fn net(&self) -> i64 {
        self.upvotes - self.downvotes
    }

    pub fn inverse(&self) -> Self {
        Self {
            upvotes: -self.upvotes,
            downvotes: -self.downvotes,
        }
    }
}

/// Everything the backend needs to persist one vote transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteChange {
    pub write: VoteWrite,
    pub delta: CounterDelta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTransition {
    pub from: VoteState,
    pub to: VoteState,
}

impl VoteTransition {
    pub fn counter_delta(&self) -> CounterDelta {
        let side = |state: VoteState| match state {
            VoteState::None => (0, 0),
            VoteState::Up => (1, 0),
            VoteState::Down => (0, 1),
        };
        let (from_up, from_down) = side(self.from);
        let (to_up, to_down) = side(self.to);
        CounterDelta {
            upvotes: to_up - from_up,
            downvotes: to_down - from_down,
        }
    }

    /// The persistence call for this transition, or `None` for a no-op.
    pub fn change(&self) -> Option<VoteChange> {
        let write = match (self.from.as_direction(), self.to.as_direction()) {
            (None, Some(is_upvote)) => VoteWrite::Insert { is_upvote },
            (Some(_), None) => VoteWrite::Delete,
            (Some(a), Some(b)) if a != b => VoteWrite::Update { is_upvote: b },
            _ => return None,
        };
        Some(VoteChange {
            write,
            delta: self.counter_delta(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookmarkState {
    #[default]
    Absent,
    Present,
}

impl BookmarkState {
    pub fn from_flag(bookmarked: bool) -> Self {
        if bookmarked {
            Self::Present
        } else {
            Self::Absent
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present)
    }

    pub fn toggle(self) -> Self {
        match self {
            Self::Absent => Self::Present,
            Self::Present => Self::Absent,
        }
    }
}

/// Locally displayed interaction state of one post for one viewer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionState {
    pub vote: VoteState,
    pub upvotes: u32,
    pub downvotes: u32,
    pub bookmark: BookmarkState,
}

impl InteractionState {
    pub fn score(&self) -> i64 {
        i64::from(self.upvotes) - i64::from(self.downvotes)
    }

    /// Apply a vote transition to local state. Counters saturate at zero.
    pub fn apply_vote(&mut self, transition: &VoteTransition) {
        let delta = transition.counter_delta();
        self.upvotes = offset_counter(self.upvotes, delta.upvotes);
        self.downvotes = offset_counter(self.downvotes, delta.downvotes);
        self.vote = transition.to;
    }
}

fn offset_counter(current: u32, delta: i64) -> u32 {
    let next = i64::from(current) + delta;
    u32::try_from(next.max(0)).unwrap_or(u32::MAX)
}
