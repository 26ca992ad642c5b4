//! Toggling LIKE / DISLIKE on reviews and posts.

use crate::environment::ContentEnvironment;
use crate::error::{ContentError, Result};
use crate::keys;
use crate::providers::ContentStore;
use crate::reaction::{Change, ReactionState};
use crate::state::{
    Counters, MemberId, PostId, Reaction, ReactionId, ReactionKind, ReactionTarget, ReviewId,
};
use chrono::{DateTime, Utc};
use tastebud_core::lock::LockStore;

/// State of the member's reaction and the target's counters after a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactionOutcome {
    /// The member's reaction after the toggle
    pub state: ReactionState,
    /// The target's counters after the toggle
    pub counters: Counters,
}

/// Toggle reactions under the target's reaction key.
pub struct ReactionService<S: ContentStore, L: LockStore> {
    env: ContentEnvironment<S, L>,
}

impl<S: ContentStore, L: LockStore> Clone for ReactionService<S, L> {
    fn clone(&self) -> Self {
        Self {
            env: self.env.clone(),
        }
    }
}

impl<S: ContentStore, L: LockStore> ReactionService<S, L> {
    /// Create a new reaction service.
    #[must_use]
    pub const fn new(env: ContentEnvironment<S, L>) -> Self {
        Self { env }
    }

    /// Toggle `kind` on a review.
    ///
    /// # Errors
    ///
    /// - [`ContentError::NotFound`] if the review does not exist
    /// - [`ContentError::CounterUnderflow`] if the stored counters disagree
    ///   with the stored reactions
    /// - not-executed errors if the review's reactions stayed locked
    pub async fn toggle_review_reaction(
        &self,
        member_id: MemberId,
        review_id: ReviewId,
        kind: ReactionKind,
    ) -> Result<ReactionOutcome> {
        let store = self.env.store.clone();
        let now = self.env.clock.now();

        let outcome = self
            .env
            .protected(keys::review_reaction_key(review_id), move |tx| {
                Box::pin(async move {
                    let review = store
                        .find_review(tx, review_id)
                        .await?
                        .ok_or_else(|| ContentError::not_found("review", review_id))?;

                    let target = ReactionTarget::Review(review_id);
                    let outcome =
                        toggle(&store, tx, target, member_id, kind, review.counters, now).await?;
                    store
                        .update_review_counters(tx, review_id, outcome.counters)
                        .await?;
                    Ok(outcome)
                })
            })
            .await?;

        tracing::info!(
            review_id = %review_id,
            member_id = %member_id,
            requested = kind.as_str(),
            state = ?outcome.state,
            like_count = outcome.counters.like_count,
            dislike_count = outcome.counters.dislike_count,
            "Review reaction toggled"
        );

        Ok(outcome)
    }

    /// Toggle `kind` on a post.
    ///
    /// # Errors
    ///
    /// Same as [`ReactionService::toggle_review_reaction`], for posts.
    pub async fn toggle_post_reaction(
        &self,
        member_id: MemberId,
        post_id: PostId,
        kind: ReactionKind,
    ) -> Result<ReactionOutcome> {
        let store = self.env.store.clone();
        let now = self.env.clock.now();

        let outcome = self
            .env
            .protected(keys::post_reaction_key(post_id), move |tx| {
                Box::pin(async move {
                    let post = store
                        .find_post(tx, post_id)
                        .await?
                        .ok_or_else(|| ContentError::not_found("post", post_id))?;

                    let target = ReactionTarget::Post(post_id);
                    let outcome =
                        toggle(&store, tx, target, member_id, kind, post.counters, now).await?;
                    store.update_post_counters(tx, post_id, outcome.counters).await?;
                    Ok(outcome)
                })
            })
            .await?;

        tracing::info!(
            post_id = %post_id,
            member_id = %member_id,
            requested = kind.as_str(),
            state = ?outcome.state,
            like_count = outcome.counters.like_count,
            dislike_count = outcome.counters.dislike_count,
            "Post reaction toggled"
        );

        Ok(outcome)
    }
}

/// Apply one toggle to the reaction rows of `target`. Caller persists the
/// returned counters.
async fn toggle<S: ContentStore>(
    store: &S,
    tx: &mut S::Tx,
    target: ReactionTarget,
    member_id: MemberId,
    requested: ReactionKind,
    counters: Counters,
    now: DateTime<Utc>,
) -> Result<ReactionOutcome> {
    let existing = store.find_reaction(tx, target, member_id).await?;
    let step = ReactionState::from_kind(existing.as_ref().map(|r| r.kind)).apply(requested);
    let counters = counters.apply(&step)?;

    match existing {
        None => {
            let reaction = Reaction {
                id: ReactionId::new(),
                kind: requested,
                target,
                member_id,
                created_at: now,
            };
            store.insert_reaction(tx, &reaction).await?;
        }
        Some(reaction) => match step.change {
            Change::Delete => store.delete_reaction(tx, reaction.id).await?,
            Change::Update(kind) | Change::Insert(kind) => {
                store.update_reaction_kind(tx, reaction.id, kind).await?;
            }
        },
    }

    Ok(ReactionOutcome {
        state: step.next,
        counters,
    })
}
