//! Review operations.
//!
//! Reviews of a restaurant and its rating aggregate are guarded by
//! `review-restaurant-<id>`. Deleting a review also takes the review's own
//! key and its reaction key, since it removes the reactions and counters
//! guarded there.

use crate::environment::ContentEnvironment;
use crate::error::{ContentError, Result};
use crate::keys;
use crate::operations::validate_text;
use crate::providers::ContentStore;
use crate::state::{Counters, MemberId, Rating, ReactionTarget, RestaurantId, Review, ReviewId};
use tastebud_core::lock::LockStore;

/// Create, edit and delete restaurant reviews.
pub struct ReviewService<S: ContentStore, L: LockStore> {
    env: ContentEnvironment<S, L>,
}

impl<S: ContentStore, L: LockStore> Clone for ReviewService<S, L> {
    fn clone(&self) -> Self {
        Self {
            env: self.env.clone(),
        }
    }
}

impl<S: ContentStore, L: LockStore> ReviewService<S, L> {
    /// Create a new review service.
    #[must_use]
    pub const fn new(env: ContentEnvironment<S, L>) -> Self {
        Self { env }
    }

    /// Review a restaurant.
    ///
    /// The one-review-per-member check runs under the restaurant's lock, so
    /// two concurrent first reviews by the same member cannot both pass it.
    ///
    /// # Errors
    ///
    /// - [`ContentError::InvalidRating`] / [`ContentError::InvalidContent`]
    /// - [`ContentError::NotFound`] if the restaurant does not exist
    /// - [`ContentError::AlreadyReviewed`] if the member reviewed it before
    /// - not-executed errors if the restaurant stayed locked
    pub async fn create_review(
        &self,
        member_id: MemberId,
        restaurant_id: RestaurantId,
        rating: u8,
        content: &str,
    ) -> Result<Review> {
        let rating = Rating::new(rating)?;
        let content = validate_text("content", content, self.env.config.max_content_len)?;
        let store = self.env.store.clone();
        let now = self.env.clock.now();

        let review = self
            .env
            .protected(keys::restaurant_review_key(restaurant_id), move |tx| {
                Box::pin(async move {
                    let mut restaurant = store
                        .find_restaurant(tx, restaurant_id)
                        .await?
                        .ok_or_else(|| ContentError::not_found("restaurant", restaurant_id))?;

                    if store
                        .find_review_by_author(tx, restaurant_id, member_id)
                        .await?
                        .is_some()
                    {
                        return Err(ContentError::AlreadyReviewed {
                            member_id,
                            restaurant_id,
                        });
                    }

                    let review = Review {
                        id: ReviewId::new(),
                        restaurant_id,
                        member_id,
                        rating,
                        content,
                        counters: Counters::default(),
                        created_at: now,
                        updated_at: now,
                    };
                    store.insert_review(tx, &review).await?;

                    restaurant.add_rating(rating)?;
                    store
                        .update_restaurant_rating(
                            tx,
                            restaurant_id,
                            restaurant.review_count,
                            restaurant.rating_total,
                        )
                        .await?;

                    Ok(review)
                })
            })
            .await?;

        tracing::info!(
            review_id = %review.id,
            restaurant_id = %restaurant_id,
            member_id = %member_id,
            rating = rating.value(),
            "Review created"
        );

        Ok(review)
    }

    /// Replace the rating and text of the member's own review.
    ///
    /// # Errors
    ///
    /// - [`ContentError::InvalidRating`] / [`ContentError::InvalidContent`]
    /// - [`ContentError::NotFound`] if the review does not exist
    /// - [`ContentError::NotOwner`] if someone else wrote it
    /// - not-executed errors if the restaurant stayed locked
    pub async fn update_review(
        &self,
        member_id: MemberId,
        review_id: ReviewId,
        rating: u8,
        content: &str,
    ) -> Result<Review> {
        let rating = Rating::new(rating)?;
        let content = validate_text("content", content, self.env.config.max_content_len)?;
        let restaurant_id = self.restaurant_of(review_id).await?;
        let store = self.env.store.clone();
        let now = self.env.clock.now();

        let review = self
            .env
            .protected(keys::restaurant_review_key(restaurant_id), move |tx| {
                Box::pin(async move {
                    let mut review = store
                        .find_review(tx, review_id)
                        .await?
                        .ok_or_else(|| ContentError::not_found("review", review_id))?;
                    if review.member_id != member_id {
                        return Err(ContentError::NotOwner { resource: "review" });
                    }

                    let mut restaurant = store
                        .find_restaurant(tx, restaurant_id)
                        .await?
                        .ok_or_else(|| ContentError::not_found("restaurant", restaurant_id))?;
                    restaurant.replace_rating(review.rating, rating)?;

                    store
                        .update_review_body(tx, review_id, rating, &content, now)
                        .await?;
                    store
                        .update_restaurant_rating(
                            tx,
                            restaurant_id,
                            restaurant.review_count,
                            restaurant.rating_total,
                        )
                        .await?;

                    review.rating = rating;
                    review.content = content;
                    review.updated_at = now;
                    Ok(review)
                })
            })
            .await?;

        tracing::info!(review_id = %review_id, member_id = %member_id, "Review updated");
        Ok(review)
    }

    /// Delete the member's own review with its reactions.
    ///
    /// # Errors
    ///
    /// - [`ContentError::NotFound`] if the review does not exist
    /// - [`ContentError::NotOwner`] if someone else wrote it
    /// - not-executed errors if any of the keys stayed locked
    pub async fn delete_review(&self, member_id: MemberId, review_id: ReviewId) -> Result<()> {
        let restaurant_id = self.restaurant_of(review_id).await?;
        let store = self.env.store.clone();
        let locks = vec![
            keys::review_key(review_id),
            keys::restaurant_review_key(restaurant_id),
            keys::review_reaction_key(review_id),
        ];

        let removed_reactions = self
            .env
            .protected_all(locks, move |tx| {
                Box::pin(async move {
                    let review = store
                        .find_review(tx, review_id)
                        .await?
                        .ok_or_else(|| ContentError::not_found("review", review_id))?;
                    if review.member_id != member_id {
                        return Err(ContentError::NotOwner { resource: "review" });
                    }

                    let removed = store
                        .delete_reactions_of(tx, ReactionTarget::Review(review_id))
                        .await?;
                    store.delete_review(tx, review_id).await?;

                    if let Some(mut restaurant) = store.find_restaurant(tx, restaurant_id).await? {
                        restaurant.remove_rating(review.rating)?;
                        store
                            .update_restaurant_rating(
                                tx,
                                restaurant_id,
                                restaurant.review_count,
                                restaurant.rating_total,
                            )
                            .await?;
                    }

                    Ok(removed)
                })
            })
            .await?;

        tracing::info!(
            review_id = %review_id,
            restaurant_id = %restaurant_id,
            removed_reactions,
            "Review deleted"
        );

        Ok(())
    }

    /// Restaurant of a review, read outside any lock. A review never moves.
    async fn restaurant_of(&self, review_id: ReviewId) -> Result<RestaurantId> {
        let store = self.env.store.clone();
        self.env
            .lookup(move |tx| {
                Box::pin(async move {
                    store
                        .find_review(tx, review_id)
                        .await?
                        .map(|review| review.restaurant_id)
                        .ok_or_else(|| ContentError::not_found("review", review_id))
                })
            })
            .await
    }
}
