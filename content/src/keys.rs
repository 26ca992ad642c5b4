//! Lock keys of the protected operations.
//!
//! One builder per protected resource. Operations that touch several
//! resources take several keys; the executor acquires them in sorted order.

use crate::state::{CommentId, PostId, RestaurantId, ReviewId};
use tastebud_core::LockKey;

/// Reviews of a restaurant and its rating aggregate.
#[must_use]
pub fn restaurant_review_key(restaurant_id: RestaurantId) -> LockKey {
    LockKey::new("review-restaurant", restaurant_id)
}

/// A single review.
#[must_use]
pub fn review_key(review_id: ReviewId) -> LockKey {
    LockKey::new("review", review_id)
}

/// Reactions and counters of a review.
#[must_use]
pub fn review_reaction_key(review_id: ReviewId) -> LockKey {
    LockKey::new("reaction-review", review_id)
}

/// Reactions and counters of a post.
#[must_use]
pub fn post_reaction_key(post_id: PostId) -> LockKey {
    LockKey::new("reaction-post", post_id)
}

/// Comment collection and `comment_count` of a post.
#[must_use]
pub fn post_comment_key(post_id: PostId) -> LockKey {
    LockKey::new("comment-post", post_id)
}

/// A single comment.
#[must_use]
pub fn comment_key(comment_id: CommentId) -> LockKey {
    LockKey::new("comment", comment_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shapes() {
        let restaurant = RestaurantId(uuid::Uuid::nil());
        let review = ReviewId(uuid::Uuid::nil());

        assert_eq!(
            restaurant_review_key(restaurant).as_str(),
            "review-restaurant-00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            review_reaction_key(review).as_str(),
            "reaction-review-00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_same_id_different_resources() {
        let post = PostId::new();
        assert_ne!(post_reaction_key(post), post_comment_key(post));
    }
}
