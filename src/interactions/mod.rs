pub mod domain;
pub mod reconciler;

pub use domain::{BookmarkState, InteractionState, VoteClick, VoteState};
pub use reconciler::{PendingMutation, Reconciler};
