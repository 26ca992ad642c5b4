//! Persistence collaborator of the content operations.
//!
//! Every call takes the explicit transaction handle of the protected section.
//! Writes are column-targeted: an operation only rewrites the columns guarded
//! by the lock it holds, so operations holding different keys on the same row
//! never overwrite each other's columns.

use crate::error::Result;
use crate::state::{
    Comment, CommentId, Counters, MemberId, Post, PostId, Reaction, ReactionId, ReactionKind,
    ReactionTarget, Restaurant, RestaurantId, Review, ReviewId,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use tastebud_core::TransactionManager;

/// Transactional storage for restaurants, reviews, posts, comments and
/// reactions.
///
/// Handles are cheap to clone; clones share the same back-end.
pub trait ContentStore: TransactionManager + Clone {
    // ═══════════════════════════════════════════════════════════
    // Restaurants
    // ═══════════════════════════════════════════════════════════

    /// Insert a restaurant.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ContentError::Database`] on back-end failure.
    fn insert_restaurant(
        &self,
        tx: &mut Self::Tx,
        restaurant: &Restaurant,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Load a restaurant.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ContentError::Database`] on back-end failure.
    fn find_restaurant(
        &self,
        tx: &mut Self::Tx,
        id: RestaurantId,
    ) -> impl Future<Output = Result<Option<Restaurant>>> + Send;

    /// Overwrite the rating aggregate of a restaurant.
    ///
    /// # Errors
    ///
    /// - [`crate::ContentError::NotFound`] if the row no longer exists
    /// - [`crate::ContentError::Database`] on back-end failure
    fn update_restaurant_rating(
        &self,
        tx: &mut Self::Tx,
        id: RestaurantId,
        review_count: u64,
        rating_total: u64,
    ) -> impl Future<Output = Result<()>> + Send;

    // ═══════════════════════════════════════════════════════════
    // Reviews
    // ═══════════════════════════════════════════════════════════

    /// Load a review.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ContentError::Database`] on back-end failure.
    fn find_review(
        &self,
        tx: &mut Self::Tx,
        id: ReviewId,
    ) -> impl Future<Output = Result<Option<Review>>> + Send;

    /// Load the review `member_id` wrote for `restaurant_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ContentError::Database`] on back-end failure.
    fn find_review_by_author(
        &self,
        tx: &mut Self::Tx,
        restaurant_id: RestaurantId,
        member_id: MemberId,
    ) -> impl Future<Output = Result<Option<Review>>> + Send;

    /// Insert a review.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ContentError::Database`] on back-end failure.
    fn insert_review(&self, tx: &mut Self::Tx, review: &Review)
    -> impl Future<Output = Result<()>> + Send;

    /// Overwrite rating and text of a review.
    ///
    /// # Errors
    ///
    /// - [`crate::ContentError::NotFound`] if the row no longer exists
    /// - [`crate::ContentError::Database`] on back-end failure
    fn update_review_body(
        &self,
        tx: &mut Self::Tx,
        id: ReviewId,
        rating: crate::state::Rating,
        content: &str,
        updated_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Overwrite the reaction counters of a review.
    ///
    /// # Errors
    ///
    /// - [`crate::ContentError::NotFound`] if the row no longer exists
    /// - [`crate::ContentError::Database`] on back-end failure
    fn update_review_counters(
        &self,
        tx: &mut Self::Tx,
        id: ReviewId,
        counters: Counters,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Delete a review.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ContentError::Database`] on back-end failure.
    fn delete_review(&self, tx: &mut Self::Tx, id: ReviewId)
    -> impl Future<Output = Result<()>> + Send;

    // ═══════════════════════════════════════════════════════════
    // Posts
    // ═══════════════════════════════════════════════════════════

    /// Load a post.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ContentError::Database`] on back-end failure.
    fn find_post(
        &self,
        tx: &mut Self::Tx,
        id: PostId,
    ) -> impl Future<Output = Result<Option<Post>>> + Send;

    /// Insert a post.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ContentError::Database`] on back-end failure.
    fn insert_post(&self, tx: &mut Self::Tx, post: &Post) -> impl Future<Output = Result<()>> + Send;

    /// Overwrite the reaction counters of a post.
    ///
    /// # Errors
    ///
    /// - [`crate::ContentError::NotFound`] if the row no longer exists
    /// - [`crate::ContentError::Database`] on back-end failure
    fn update_post_counters(
        &self,
        tx: &mut Self::Tx,
        id: PostId,
        counters: Counters,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Overwrite the comment count of a post.
    ///
    /// # Errors
    ///
    /// - [`crate::ContentError::NotFound`] if the row no longer exists
    /// - [`crate::ContentError::Database`] on back-end failure
    fn update_comment_count(
        &self,
        tx: &mut Self::Tx,
        id: PostId,
        comment_count: u64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Delete a post.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ContentError::Database`] on back-end failure.
    fn delete_post(&self, tx: &mut Self::Tx, id: PostId) -> impl Future<Output = Result<()>> + Send;

    // ═══════════════════════════════════════════════════════════
    // Comments
    // ═══════════════════════════════════════════════════════════

    /// Load a comment.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ContentError::Database`] on back-end failure.
    fn find_comment(
        &self,
        tx: &mut Self::Tx,
        id: CommentId,
    ) -> impl Future<Output = Result<Option<Comment>>> + Send;

    /// Insert a comment.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ContentError::Database`] on back-end failure.
    fn insert_comment(
        &self,
        tx: &mut Self::Tx,
        comment: &Comment,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Overwrite the text of a comment.
    ///
    /// # Errors
    ///
    /// - [`crate::ContentError::NotFound`] if the row no longer exists
    /// - [`crate::ContentError::Database`] on back-end failure
    fn update_comment_content(
        &self,
        tx: &mut Self::Tx,
        id: CommentId,
        content: &str,
        updated_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Delete a comment.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ContentError::Database`] on back-end failure.
    fn delete_comment(&self, tx: &mut Self::Tx, id: CommentId)
    -> impl Future<Output = Result<()>> + Send;

    /// Delete every comment of a post; returns how many were deleted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ContentError::Database`] on back-end failure.
    fn delete_comments_of_post(
        &self,
        tx: &mut Self::Tx,
        post_id: PostId,
    ) -> impl Future<Output = Result<u64>> + Send;

    // ═══════════════════════════════════════════════════════════
    // Reactions
    // ═══════════════════════════════════════════════════════════

    /// Load the live reaction of `member_id` on `target`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ContentError::Database`] on back-end failure.
    fn find_reaction(
        &self,
        tx: &mut Self::Tx,
        target: ReactionTarget,
        member_id: MemberId,
    ) -> impl Future<Output = Result<Option<Reaction>>> + Send;

    /// Insert a reaction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ContentError::Database`] on back-end failure.
    fn insert_reaction(
        &self,
        tx: &mut Self::Tx,
        reaction: &Reaction,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Switch the kind of a reaction.
    ///
    /// # Errors
    ///
    /// - [`crate::ContentError::NotFound`] if the row no longer exists
    /// - [`crate::ContentError::Database`] on back-end failure
    fn update_reaction_kind(
        &self,
        tx: &mut Self::Tx,
        id: ReactionId,
        kind: ReactionKind,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Delete a reaction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ContentError::Database`] on back-end failure.
    fn delete_reaction(
        &self,
        tx: &mut Self::Tx,
        id: ReactionId,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Delete every reaction on `target`; returns how many were deleted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ContentError::Database`] on back-end failure.
    fn delete_reactions_of(
        &self,
        tx: &mut Self::Tx,
        target: ReactionTarget,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Count live reactions of `kind` on `target`.
    ///
    /// Verification helper: mutation paths trust the stored counters and
    /// never call it. It checks those counters against the reaction rows.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ContentError::Database`] on back-end failure.
    fn count_reactions(
        &self,
        tx: &mut Self::Tx,
        target: ReactionTarget,
        kind: ReactionKind,
    ) -> impl Future<Output = Result<u64>> + Send;
}
