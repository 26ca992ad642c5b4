//! In-memory content store.
//!
//! `begin` snapshots the committed tables. Reads are served from the
//! snapshot, writes are applied to the snapshot and logged. `commit` replays
//! the log onto the committed tables under one mutex, checks the uniqueness
//! constraints a database would enforce, and publishes the result atomically.
//! A targeted update of a row that is missing, in the snapshot or at commit,
//! is an error rather than a silent no-op.
//! Dropping or rolling back a transaction discards the log.

use crate::error::{ContentError, Result};
use crate::providers::ContentStore;
use crate::state::{
    Comment, CommentId, Counters, MemberId, Post, PostId, Rating, Reaction, ReactionId,
    ReactionKind, ReactionTarget, Restaurant, RestaurantId, Review, ReviewId,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tastebud_core::transaction;
use tastebud_core::{TransactionError, TransactionManager};

#[derive(Debug, Clone, Default)]
struct Tables {
    restaurants: HashMap<RestaurantId, Restaurant>,
    reviews: HashMap<ReviewId, Review>,
    posts: HashMap<PostId, Post>,
    comments: HashMap<CommentId, Comment>,
    reactions: HashMap<ReactionId, Reaction>,
}

impl Tables {
    fn check_constraints(&self) -> std::result::Result<(), String> {
        let mut authors = HashSet::new();
        for review in self.reviews.values() {
            if !authors.insert((review.restaurant_id, review.member_id)) {
                return Err(format!(
                    "unique violation: member {} reviewed restaurant {} twice",
                    review.member_id, review.restaurant_id
                ));
            }
        }

        let mut reactors = HashSet::new();
        for reaction in self.reactions.values() {
            if !reactors.insert((reaction.target, reaction.member_id)) {
                return Err(format!(
                    "unique violation: member {} reacted twice to {:?}",
                    reaction.member_id, reaction.target
                ));
            }
        }

        Ok(())
    }
}

/// A logged write.
#[derive(Debug, Clone)]
enum Op {
    InsertRestaurant(Restaurant),
    RestaurantRating {
        id: RestaurantId,
        review_count: u64,
        rating_total: u64,
    },
    InsertReview(Review),
    ReviewBody {
        id: ReviewId,
        rating: Rating,
        content: String,
        updated_at: DateTime<Utc>,
    },
    ReviewCounters {
        id: ReviewId,
        counters: Counters,
    },
    DeleteReview(ReviewId),
    InsertPost(Post),
    PostCounters {
        id: PostId,
        counters: Counters,
    },
    CommentCount {
        id: PostId,
        comment_count: u64,
    },
    DeletePost(PostId),
    InsertComment(Comment),
    CommentContent {
        id: CommentId,
        content: String,
        updated_at: DateTime<Utc>,
    },
    DeleteComment(CommentId),
    DeleteCommentsOfPost(PostId),
    InsertReaction(Reaction),
    SwitchReaction {
        id: ReactionId,
        kind: ReactionKind,
    },
    DeleteReaction(ReactionId),
    DeleteReactionsOf(ReactionTarget),
}

impl Op {
    /// Apply the write. Returns `false` if a targeted row was missing.
    fn apply(&self, t: &mut Tables) -> bool {
        match self {
            Self::InsertRestaurant(r) => {
                t.restaurants.insert(r.id, r.clone());
                true
            }
            Self::RestaurantRating {
                id,
                review_count,
                rating_total,
            } => t
                .restaurants
                .get_mut(id)
                .map(|r| {
                    r.review_count = *review_count;
                    r.rating_total = *rating_total;
                })
                .is_some(),
            Self::InsertReview(r) => {
                t.reviews.insert(r.id, r.clone());
                true
            }
            Self::ReviewBody {
                id,
                rating,
                content,
                updated_at,
            } => t
                .reviews
                .get_mut(id)
                .map(|r| {
                    r.rating = *rating;
                    r.content.clone_from(content);
                    r.updated_at = *updated_at;
                })
                .is_some(),
            Self::ReviewCounters { id, counters } => t
                .reviews
                .get_mut(id)
                .map(|r| r.counters = *counters)
                .is_some(),
            Self::DeleteReview(id) => {
                t.reviews.remove(id);
                true
            }
            Self::InsertPost(p) => {
                t.posts.insert(p.id, p.clone());
                true
            }
            Self::PostCounters { id, counters } => t
                .posts
                .get_mut(id)
                .map(|p| p.counters = *counters)
                .is_some(),
            Self::CommentCount { id, comment_count } => t
                .posts
                .get_mut(id)
                .map(|p| p.comment_count = *comment_count)
                .is_some(),
            Self::DeletePost(id) => {
                t.posts.remove(id);
                true
            }
            Self::InsertComment(c) => {
                t.comments.insert(c.id, c.clone());
                true
            }
            Self::CommentContent {
                id,
                content,
                updated_at,
            } => t
                .comments
                .get_mut(id)
                .map(|c| {
                    c.content.clone_from(content);
                    c.updated_at = *updated_at;
                })
                .is_some(),
            Self::DeleteComment(id) => {
                t.comments.remove(id);
                true
            }
            Self::DeleteCommentsOfPost(post_id) => {
                t.comments.retain(|_, c| c.post_id != *post_id);
                true
            }
            Self::InsertReaction(r) => {
                t.reactions.insert(r.id, r.clone());
                true
            }
            Self::SwitchReaction { id, kind } => t
                .reactions
                .get_mut(id)
                .map(|r| r.kind = *kind)
                .is_some(),
            Self::DeleteReaction(id) => {
                t.reactions.remove(id);
                true
            }
            Self::DeleteReactionsOf(target) => {
                t.reactions.retain(|_, r| r.target != *target);
                true
            }
        }
    }
}

/// Transaction handle of [`InMemoryContentStore`].
#[derive(Debug)]
pub struct MemoryTx {
    snapshot: Tables,
    log: Vec<Op>,
}

impl MemoryTx {
    fn write(&mut self, op: Op) {
        op.apply(&mut self.snapshot);
        self.log.push(op);
    }

    /// Log a targeted update, failing with `NotFound` if the row is gone.
    fn update(&mut self, op: Op, resource: &'static str, id: impl std::fmt::Display) -> Result<()> {
        if !op.apply(&mut self.snapshot) {
            return Err(ContentError::not_found(resource, id));
        }
        self.log.push(op);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Inner {
    tables: Mutex<Tables>,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

/// In-memory [`ContentStore`] for tests.
///
/// Clones share the same tables. An optional per-read latency makes
/// protected sections yield, so concurrent tests interleave the way they
/// would against a real database.
#[derive(Debug, Clone, Default)]
pub struct InMemoryContentStore {
    inner: Arc<Inner>,
    latency: Duration,
}

impl InMemoryContentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `latency` before every read.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn committed<T>(&self, read: impl FnOnce(&Tables) -> T) -> Option<T> {
        self.inner.tables.lock().ok().map(|tables| read(&tables))
    }

    /// Committed restaurant.
    #[must_use]
    pub fn restaurant(&self, id: RestaurantId) -> Option<Restaurant> {
        self.committed(|t| t.restaurants.get(&id).cloned()).flatten()
    }

    /// Committed review.
    #[must_use]
    pub fn review(&self, id: ReviewId) -> Option<Review> {
        self.committed(|t| t.reviews.get(&id).cloned()).flatten()
    }

    /// Committed reviews of a restaurant.
    #[must_use]
    pub fn reviews_of(&self, restaurant_id: RestaurantId) -> Vec<Review> {
        self.committed(|t| {
            t.reviews
                .values()
                .filter(|r| r.restaurant_id == restaurant_id)
                .cloned()
                .collect()
        })
        .unwrap_or_default()
    }

    /// Committed post.
    #[must_use]
    pub fn post(&self, id: PostId) -> Option<Post> {
        self.committed(|t| t.posts.get(&id).cloned()).flatten()
    }

    /// Committed comment.
    #[must_use]
    pub fn comment(&self, id: CommentId) -> Option<Comment> {
        self.committed(|t| t.comments.get(&id).cloned()).flatten()
    }

    /// Committed comments of a post.
    #[must_use]
    pub fn comments_of(&self, post_id: PostId) -> Vec<Comment> {
        self.committed(|t| {
            t.comments
                .values()
                .filter(|c| c.post_id == post_id)
                .cloned()
                .collect()
        })
        .unwrap_or_default()
    }

    /// Committed reactions on a target.
    #[must_use]
    pub fn reactions_on(&self, target: ReactionTarget) -> Vec<Reaction> {
        self.committed(|t| {
            t.reactions
                .values()
                .filter(|r| r.target == target)
                .cloned()
                .collect()
        })
        .unwrap_or_default()
    }

    /// Number of committed transactions.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.inner.commits.load(Ordering::SeqCst)
    }

    /// Number of rolled back transactions.
    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.inner.rollbacks.load(Ordering::SeqCst)
    }
}

impl TransactionManager for InMemoryContentStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> transaction::Result<MemoryTx> {
        let snapshot = self
            .inner
            .tables
            .lock()
            .map_err(|_| TransactionError::Begin("Mutex lock failed".into()))?
            .clone();
        Ok(MemoryTx {
            snapshot,
            log: Vec::new(),
        })
    }

    async fn commit(&self, tx: MemoryTx) -> transaction::Result<()> {
        let mut tables = self
            .inner
            .tables
            .lock()
            .map_err(|_| TransactionError::Commit("Mutex lock failed".into()))?;

        let mut next = tables.clone();
        for op in &tx.log {
            if !op.apply(&mut next) {
                return Err(TransactionError::Commit(format!(
                    "write conflict: {op:?} targets a row deleted by a concurrent commit"
                )));
            }
        }
        next.check_constraints().map_err(TransactionError::Commit)?;

        *tables = next;
        drop(tables);
        self.inner.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) -> transaction::Result<()> {
        drop(tx);
        self.inner.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl ContentStore for InMemoryContentStore {
    async fn insert_restaurant(&self, tx: &mut MemoryTx, restaurant: &Restaurant) -> Result<()> {
        tx.write(Op::InsertRestaurant(restaurant.clone()));
        Ok(())
    }

    async fn find_restaurant(&self, tx: &mut MemoryTx, id: RestaurantId) -> Result<Option<Restaurant>> {
        self.pause().await;
        Ok(tx.snapshot.restaurants.get(&id).cloned())
    }

    async fn update_restaurant_rating(
        &self,
        tx: &mut MemoryTx,
        id: RestaurantId,
        review_count: u64,
        rating_total: u64,
    ) -> Result<()> {
        tx.update(
            Op::RestaurantRating {
                id,
                review_count,
                rating_total,
            },
            "restaurant",
            id,
        )
    }

    async fn find_review(&self, tx: &mut MemoryTx, id: ReviewId) -> Result<Option<Review>> {
        self.pause().await;
        Ok(tx.snapshot.reviews.get(&id).cloned())
    }

    async fn find_review_by_author(
        &self,
        tx: &mut MemoryTx,
        restaurant_id: RestaurantId,
        member_id: MemberId,
    ) -> Result<Option<Review>> {
        self.pause().await;
        Ok(tx
            .snapshot
            .reviews
            .values()
            .find(|r| r.restaurant_id == restaurant_id && r.member_id == member_id)
            .cloned())
    }

    async fn insert_review(&self, tx: &mut MemoryTx, review: &Review) -> Result<()> {
        tx.write(Op::InsertReview(review.clone()));
        Ok(())
    }

    async fn update_review_body(
        &self,
        tx: &mut MemoryTx,
        id: ReviewId,
        rating: Rating,
        content: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        tx.update(
            Op::ReviewBody {
                id,
                rating,
                content: content.to_string(),
                updated_at,
            },
            "review",
            id,
        )
    }

    async fn update_review_counters(&self, tx: &mut MemoryTx, id: ReviewId, counters: Counters) -> Result<()> {
        tx.update(Op::ReviewCounters { id, counters }, "review", id)
    }

    async fn delete_review(&self, tx: &mut MemoryTx, id: ReviewId) -> Result<()> {
        tx.write(Op::DeleteReview(id));
        Ok(())
    }

    async fn find_post(&self, tx: &mut MemoryTx, id: PostId) -> Result<Option<Post>> {
        self.pause().await;
        Ok(tx.snapshot.posts.get(&id).cloned())
    }

    async fn insert_post(&self, tx: &mut MemoryTx, post: &Post) -> Result<()> {
        tx.write(Op::InsertPost(post.clone()));
        Ok(())
    }

    async fn update_post_counters(&self, tx: &mut MemoryTx, id: PostId, counters: Counters) -> Result<()> {
        tx.update(Op::PostCounters { id, counters }, "post", id)
    }

    async fn update_comment_count(&self, tx: &mut MemoryTx, id: PostId, comment_count: u64) -> Result<()> {
        tx.update(Op::CommentCount { id, comment_count }, "post", id)
    }

    async fn delete_post(&self, tx: &mut MemoryTx, id: PostId) -> Result<()> {
        tx.write(Op::DeletePost(id));
        Ok(())
    }

    async fn find_comment(&self, tx: &mut MemoryTx, id: CommentId) -> Result<Option<Comment>> {
        self.pause().await;
        Ok(tx.snapshot.comments.get(&id).cloned())
    }

    async fn insert_comment(&self, tx: &mut MemoryTx, comment: &Comment) -> Result<()> {
        tx.write(Op::InsertComment(comment.clone()));
        Ok(())
    }

    async fn update_comment_content(
        &self,
        tx: &mut MemoryTx,
        id: CommentId,
        content: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        tx.update(
            Op::CommentContent {
                id,
                content: content.to_string(),
                updated_at,
            },
            "comment",
            id,
        )
    }

    async fn delete_comment(&self, tx: &mut MemoryTx, id: CommentId) -> Result<()> {
        tx.write(Op::DeleteComment(id));
        Ok(())
    }

    async fn delete_comments_of_post(&self, tx: &mut MemoryTx, post_id: PostId) -> Result<u64> {
        let deleted = tx
            .snapshot
            .comments
            .values()
            .filter(|c| c.post_id == post_id)
            .count();
        tx.write(Op::DeleteCommentsOfPost(post_id));
        Ok(deleted as u64)
    }

    async fn find_reaction(
        &self,
        tx: &mut MemoryTx,
        target: ReactionTarget,
        member_id: MemberId,
    ) -> Result<Option<Reaction>> {
        self.pause().await;
        Ok(tx
            .snapshot
            .reactions
            .values()
            .find(|r| r.target == target && r.member_id == member_id)
            .cloned())
    }

    async fn insert_reaction(&self, tx: &mut MemoryTx, reaction: &Reaction) -> Result<()> {
        tx.write(Op::InsertReaction(reaction.clone()));
        Ok(())
    }

    async fn update_reaction_kind(&self, tx: &mut MemoryTx, id: ReactionId, kind: ReactionKind) -> Result<()> {
        tx.update(Op::SwitchReaction { id, kind }, "reaction", id)
    }

    async fn delete_reaction(&self, tx: &mut MemoryTx, id: ReactionId) -> Result<()> {
        tx.write(Op::DeleteReaction(id));
        Ok(())
    }

    async fn delete_reactions_of(&self, tx: &mut MemoryTx, target: ReactionTarget) -> Result<u64> {
        let deleted = tx
            .snapshot
            .reactions
            .values()
            .filter(|r| r.target == target)
            .count();
        tx.write(Op::DeleteReactionsOf(target));
        Ok(deleted as u64)
    }

    async fn count_reactions(&self, tx: &mut MemoryTx, target: ReactionTarget, kind: ReactionKind) -> Result<u64> {
        self.pause().await;
        let count = tx
            .snapshot
            .reactions
            .values()
            .filter(|r| r.target == target && r.kind == kind)
            .count();
        Ok(count as u64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn review(restaurant_id: RestaurantId, member_id: MemberId) -> Review {
        Review {
            id: ReviewId::new(),
            restaurant_id,
            member_id,
            rating: Rating::new(4).unwrap(),
            content: "Great".into(),
            counters: Counters::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_writes_invisible_until_commit() {
        let store = InMemoryContentStore::new();
        let restaurant = Restaurant::new("Noodle Bar");

        let mut tx = store.begin().await.unwrap();
        store.insert_restaurant(&mut tx, &restaurant).await.unwrap();
        assert!(store.find_restaurant(&mut tx, restaurant.id).await.unwrap().is_some());
        assert!(store.restaurant(restaurant.id).is_none());

        store.commit(tx).await.unwrap();
        assert_eq!(store.restaurant(restaurant.id), Some(restaurant));
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = InMemoryContentStore::new();
        let restaurant = Restaurant::new("Taco Stand");

        let mut tx = store.begin().await.unwrap();
        store.insert_restaurant(&mut tx, &restaurant).await.unwrap();
        store.rollback(tx).await.unwrap();

        assert!(store.restaurant(restaurant.id).is_none());
        assert_eq!(store.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_targeted_updates_do_not_clobber() {
        let store = InMemoryContentStore::new();
        let restaurant = Restaurant::new("Diner");
        let original = review(restaurant.id, MemberId::new());

        let mut setup = store.begin().await.unwrap();
        store.insert_review(&mut setup, &original).await.unwrap();
        store.commit(setup).await.unwrap();

        // Two overlapping transactions touching different columns.
        let mut counters_tx = store.begin().await.unwrap();
        let mut body_tx = store.begin().await.unwrap();
        let liked = Counters {
            like_count: 1,
            dislike_count: 0,
        };
        store
            .update_review_counters(&mut counters_tx, original.id, liked)
            .await
            .unwrap();
        store
            .update_review_body(&mut body_tx, original.id, Rating::new(2).unwrap(), "Meh", Utc::now())
            .await
            .unwrap();
        store.commit(counters_tx).await.unwrap();
        store.commit(body_tx).await.unwrap();

        let stored = store.review(original.id).unwrap();
        assert_eq!(stored.counters, liked);
        assert_eq!(stored.content, "Meh");
    }

    #[tokio::test]
    async fn test_update_of_missing_row_is_not_found() {
        let store = InMemoryContentStore::new();
        let mut tx = store.begin().await.unwrap();

        let err = store
            .update_comment_content(&mut tx, CommentId::new(), "edited", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::NotFound { resource: "comment", .. }));

        let err = store
            .update_comment_count(&mut tx, PostId::new(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::NotFound { resource: "post", .. }));
    }

    #[tokio::test]
    async fn test_update_of_row_deleted_by_concurrent_commit_fails() {
        let store = InMemoryContentStore::new();
        let original = review(RestaurantId::new(), MemberId::new());

        let mut setup = store.begin().await.unwrap();
        store.insert_review(&mut setup, &original).await.unwrap();
        store.commit(setup).await.unwrap();

        let mut late = store.begin().await.unwrap();
        let mut delete = store.begin().await.unwrap();
        store.delete_review(&mut delete, original.id).await.unwrap();
        store.commit(delete).await.unwrap();
        store
            .update_review_counters(&mut late, original.id, Counters::default())
            .await
            .unwrap();

        let err = store.commit(late).await.unwrap_err();
        assert!(matches!(err, TransactionError::Commit(_)));
        assert!(store.review(original.id).is_none());
        assert_eq!(store.commits(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_review_rejected_at_commit() {
        let store = InMemoryContentStore::new();
        let restaurant_id = RestaurantId::new();
        let member_id = MemberId::new();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        store.insert_review(&mut first, &review(restaurant_id, member_id)).await.unwrap();
        store.insert_review(&mut second, &review(restaurant_id, member_id)).await.unwrap();

        store.commit(first).await.unwrap();
        let err = store.commit(second).await.unwrap_err();
        assert!(matches!(err, TransactionError::Commit(_)));
        assert_eq!(store.reviews_of(restaurant_id).len(), 1);
    }
}
