use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::backend::{BackendError, ContentBackend};
use crate::db::models::{PostId, UserId};
use crate::error::FeedError;
use crate::feed::domain::FeedPost;
use crate::feed::session::FeedSession;
use crate::interactions::domain::{
    BookmarkState, InteractionState, VoteChange, VoteClick, VoteTransition,
};

/// Backend write still owed for an optimistic change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingWrite {
    Vote(VoteChange),
    Bookmark(BookmarkState),
}

/// An optimistic change that has been applied locally but not yet confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutation {
    pub post_id: PostId,
    pub actor: UserId,
    pub write: PendingWrite,
    /// Local state immediately before the change; restored on failure.
    pub snapshot: InteractionState,
}

/// Applies vote and bookmark toggles optimistically and rolls them back if
/// the backend write fails.
pub struct Reconciler<B: ?Sized> {
    backend: Arc<B>,
    states: HashMap<PostId, InteractionState>,
    pending: HashSet<PostId>,
}

impl<B: ContentBackend + ?Sized> Reconciler<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            states: HashMap::new(),
            pending: HashSet::new(),
        }
    }

    /// Seed local state from freshly fetched posts. Posts with a change in
    /// flight keep their optimistic state.
    pub fn track<'a>(&mut self, posts: impl IntoIterator<Item = &'a FeedPost>) {
        for post in posts {
            if !self.pending.contains(&post.id) {
                self.states.insert(post.id, post.interaction());
            }
        }
    }

    /// Track exactly `posts`, forgetting every other post that has no change
    /// in flight. Use when a first page replaces the displayed feed.
    pub fn replace<'a>(&mut self, posts: impl IntoIterator<Item = &'a FeedPost>) {
        let posts: Vec<&FeedPost> = posts.into_iter().collect();
        let shown: HashSet<PostId> = posts.iter().map(|p| p.id).collect();
        let pending = &self.pending;
        self.states.retain(|id, _| shown.contains(id) || pending.contains(id));
        self.track(posts);
    }

    /// Stop tracking a post. A change in flight keeps its state until settled.
    pub fn untrack(&mut self, post_id: PostId) {
        if !self.pending.contains(&post_id) {
            self.states.remove(&post_id);
        }
    }

    pub fn state(&self, post_id: PostId) -> Option<InteractionState> {
        self.states.get(&post_id).copied()
    }

    pub fn is_pending(&self, post_id: PostId) -> bool {
        self.pending.contains(&post_id)
    }

    /// Write the local state of `post_id` into a displayed feed.
    pub fn patch(&self, session: &mut FeedSession, post_id: PostId) -> bool {
        match self.states.get(&post_id) {
            Some(state) => session.patch_post(post_id, |post| post.apply_interaction(state)),
            None => false,
        }
    }

    /// Apply a vote click locally and return the write to persist.
    pub fn begin_vote(
        &mut self,
        actor: Option<&UserId>,
        post_id: PostId,
        click: VoteClick,
    ) -> Result<(PendingMutation, VoteTransition), FeedError> {
        let (actor, current) = self.guard(actor, post_id)?;

        let transition = current.vote.click(click);
        let change = transition.change().ok_or_else(|| FeedError::MutationPersist {
            message: format!("vote on post {} did not change", post_id),
            retryable: false,
        })?;

        let mut next = current;
        next.apply_vote(&transition);
        self.states.insert(post_id, next);
        self.pending.insert(post_id);

        tracing::debug!(
            "Optimistic vote on post {}: {} -> {} (score {} -> {})",
            post_id,
            transition.from,
            transition.to,
            current.score(),
            next.score()
        );

        Ok((
            PendingMutation {
                post_id,
                actor,
                write: PendingWrite::Vote(change),
                snapshot: current,
            },
            transition,
        ))
    }

    /// Flip the bookmark locally and return the write to persist.
    pub fn begin_bookmark(
        &mut self,
        actor: Option<&UserId>,
        post_id: PostId,
    ) -> Result<PendingMutation, FeedError> {
        let (actor, current) = self.guard(actor, post_id)?;

        let mut next = current;
        next.bookmark = current.bookmark.toggle();
        self.states.insert(post_id, next);
        self.pending.insert(post_id);

        Ok(PendingMutation {
            post_id,
            actor,
            write: PendingWrite::Bookmark(next.bookmark),
            snapshot: current,
        })
    }

    /// Confirm or roll back a pending change with the backend's answer.
    pub fn settle(
        &mut self,
        pending: PendingMutation,
        result: Result<(), BackendError>,
    ) -> Result<InteractionState, FeedError> {
        self.pending.remove(&pending.post_id);

        match result {
            Ok(()) => Ok(self
                .states
                .get(&pending.post_id)
                .copied()
                .unwrap_or(pending.snapshot)),
            Err(e) => {
                tracing::warn!(
                    "Rolling back change to post {} by {}: {}",
                    pending.post_id,
                    pending.actor,
                    e
                );
                self.states.insert(pending.post_id, pending.snapshot);
                Err(FeedError::persist(e))
            }
        }
    }

    /// Issue the backend call for a pending change.
    pub async fn persist(&self, pending: &PendingMutation) -> Result<(), BackendError> {
        match &pending.write {
            PendingWrite::Vote(change) => {
                self.backend
                    .apply_vote_change(&pending.actor, pending.post_id, change)
                    .await
            }
            PendingWrite::Bookmark(BookmarkState::Present) => {
                self.backend
                    .insert_bookmark(&pending.actor, pending.post_id)
                    .await
            }
            PendingWrite::Bookmark(BookmarkState::Absent) => {
                self.backend
                    .delete_bookmark(&pending.actor, pending.post_id)
                    .await
            }
        }
    }

    /// Vote end to end: apply, persist, then confirm or roll back.
    pub async fn vote(
        &mut self,
        actor: Option<&UserId>,
        post_id: PostId,
        click: VoteClick,
    ) -> Result<InteractionState, FeedError> {
        let (pending, _) = self.begin_vote(actor, post_id, click)?;
        let result = self.persist(&pending).await;
        self.settle(pending, result)
    }

    /// Bookmark toggle end to end.
    pub async fn toggle_bookmark(
        &mut self,
        actor: Option<&UserId>,
        post_id: PostId,
    ) -> Result<InteractionState, FeedError> {
        let pending = self.begin_bookmark(actor, post_id)?;
        let result = self.persist(&pending).await;
        self.settle(pending, result)
    }

    fn guard(
        &self,
        actor: Option<&UserId>,
        post_id: PostId,
    ) -> Result<(UserId, InteractionState), FeedError> {
        let actor = actor.ok_or(FeedError::Unauthenticated)?;
        if self.pending.contains(&post_id) {
            return Err(FeedError::MutationPending { post_id });
        }
        let current = self
            .states
            .get(&post_id)
            .copied()
            .ok_or(FeedError::UnknownPost(post_id))?;
        Ok((actor.clone(), current))
    }
}
