//! Domain types: identifiers, aggregates and their denormalised counters.

use crate::error::{ContentError, Result};
use crate::reaction::Transition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            /// Generate a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a member.
    MemberId
);
uuid_id!(
    /// Unique identifier for a restaurant.
    RestaurantId
);
uuid_id!(
    /// Unique identifier for a review.
    ReviewId
);
uuid_id!(
    /// Unique identifier for a post.
    PostId
);
uuid_id!(
    /// Unique identifier for a comment.
    CommentId
);
uuid_id!(
    /// Unique identifier for a reaction.
    ReactionId
);

/// Star rating of a review, always within `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rating(u8);

impl Rating {
    /// Validate a raw rating.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::InvalidRating`] outside `1..=5`.
    pub fn new(value: u8) -> Result<Self> {
        if (1..=5).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ContentError::InvalidRating(value))
        }
    }

    /// The rating as a number.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

/// Kind of a live reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReactionKind {
    /// Thumbs up.
    Like,
    /// Thumbs down.
    Dislike,
}

impl ReactionKind {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Like => "LIKE",
            Self::Dislike => "DISLIKE",
        }
    }

    /// Parse the storage representation.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::Database`] for an unknown value.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "LIKE" => Ok(Self::Like),
            "DISLIKE" => Ok(Self::Dislike),
            other => Err(ContentError::Database(format!("Unknown reaction kind: {other}"))),
        }
    }
}

/// What a reaction is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReactionTarget {
    /// A restaurant review.
    Review(ReviewId),
    /// A community post.
    Post(PostId),
}

impl ReactionTarget {
    /// Storage discriminator.
    #[must_use]
    pub const fn kind_str(self) -> &'static str {
        match self {
            Self::Review(_) => "REVIEW",
            Self::Post(_) => "POST",
        }
    }

    /// Identifier of the target.
    #[must_use]
    pub const fn uuid(self) -> uuid::Uuid {
        match self {
            Self::Review(id) => id.0,
            Self::Post(id) => id.0,
        }
    }
}

/// One member's standing reaction to one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    /// Reaction ID
    pub id: ReactionId,
    /// Current kind
    pub kind: ReactionKind,
    /// Reacted-to entity
    pub target: ReactionTarget,
    /// Reacting member
    pub member_id: MemberId,
    /// First reaction time
    pub created_at: DateTime<Utc>,
}

/// Like/dislike counters stored on a review or post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    /// Number of live LIKE reactions
    pub like_count: u64,
    /// Number of live DISLIKE reactions
    pub dislike_count: u64,
}

impl Counters {
    /// Counters after applying the deltas of `transition`.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::CounterUnderflow`] if either counter would go
    /// below zero.
    pub fn apply(self, transition: &Transition) -> Result<Self> {
        Ok(Self {
            like_count: shift(self.like_count, transition.like_delta, "like_count")?,
            dislike_count: shift(self.dislike_count, transition.dislike_delta, "dislike_count")?,
        })
    }
}

fn shift(value: u64, delta: i8, counter: &'static str) -> Result<u64> {
    value
        .checked_add_signed(i64::from(delta))
        .ok_or(ContentError::CounterUnderflow { counter })
}

/// A restaurant and its rating aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restaurant {
    /// Restaurant ID
    pub id: RestaurantId,
    /// Display name
    pub name: String,
    /// Number of live reviews
    pub review_count: u64,
    /// Sum of the ratings of live reviews
    pub rating_total: u64,
}

impl Restaurant {
    /// A restaurant without reviews.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: RestaurantId::new(),
            name: name.into(),
            review_count: 0,
            rating_total: 0,
        }
    }

    /// Mean rating, 0 without reviews.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_rating(&self) -> f64 {
        if self.review_count == 0 {
            0.0
        } else {
            self.rating_total as f64 / self.review_count as f64
        }
    }

    /// Count a new review.
    ///
    /// # Errors
    ///
    /// Never fails in practice; overflow is reported as underflow of the
    /// offending counter.
    pub fn add_rating(&mut self, rating: Rating) -> Result<()> {
        self.review_count = shift(self.review_count, 1, "review_count")?;
        self.rating_total = self
            .rating_total
            .checked_add(u64::from(rating.value()))
            .ok_or(ContentError::CounterUnderflow { counter: "rating_total" })?;
        Ok(())
    }

    /// Forget a deleted review.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::CounterUnderflow`] if the aggregate does not
    /// contain the review.
    pub fn remove_rating(&mut self, rating: Rating) -> Result<()> {
        self.review_count = shift(self.review_count, -1, "review_count")?;
        self.rating_total = self
            .rating_total
            .checked_sub(u64::from(rating.value()))
            .ok_or(ContentError::CounterUnderflow { counter: "rating_total" })?;
        Ok(())
    }

    /// Swap the rating of an existing review.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::CounterUnderflow`] if the aggregate does not
    /// contain `old`.
    pub fn replace_rating(&mut self, old: Rating, new: Rating) -> Result<()> {
        self.rating_total = self
            .rating_total
            .checked_sub(u64::from(old.value()))
            .and_then(|total| total.checked_add(u64::from(new.value())))
            .ok_or(ContentError::CounterUnderflow { counter: "rating_total" })?;
        Ok(())
    }
}

/// A member's review of a restaurant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    /// Review ID
    pub id: ReviewId,
    /// Reviewed restaurant
    pub restaurant_id: RestaurantId,
    /// Author
    pub member_id: MemberId,
    /// Star rating
    pub rating: Rating,
    /// Review text
    pub content: String,
    /// Reaction counters
    pub counters: Counters,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last edit time
    pub updated_at: DateTime<Utc>,
}

/// A community post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Post ID
    pub id: PostId,
    /// Author
    pub member_id: MemberId,
    /// Title
    pub title: String,
    /// Body
    pub content: String,
    /// Reaction counters
    pub counters: Counters,
    /// Number of live comments
    pub comment_count: u64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last edit time
    pub updated_at: DateTime<Utc>,
}

/// A comment on a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Comment ID
    pub id: CommentId,
    /// Parent post
    pub post_id: PostId,
    /// Author
    pub member_id: MemberId,
    /// Comment text
    pub content: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last edit time
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::reaction::ReactionState;

    #[test]
    fn test_rating_bounds() {
        assert!(Rating::new(0).is_err());
        assert_eq!(Rating::new(1).unwrap().value(), 1);
        assert_eq!(Rating::new(5).unwrap().value(), 5);
        assert_eq!(Rating::new(6), Err(ContentError::InvalidRating(6)));
    }

    #[test]
    fn test_counters_refuse_underflow() {
        let liked_without_count = ReactionState::Liked.apply(ReactionKind::Like);
        let result = Counters::default().apply(&liked_without_count);
        assert_eq!(
            result,
            Err(ContentError::CounterUnderflow { counter: "like_count" })
        );
    }

    #[test]
    fn test_restaurant_rating_aggregate() {
        let mut restaurant = Restaurant::new("Chez Test");
        assert!((restaurant.average_rating() - 0.0).abs() < f64::EPSILON);

        restaurant.add_rating(Rating::new(4).unwrap()).unwrap();
        restaurant.add_rating(Rating::new(2).unwrap()).unwrap();
        assert!((restaurant.average_rating() - 3.0).abs() < f64::EPSILON);

        restaurant
            .replace_rating(Rating::new(2).unwrap(), Rating::new(5).unwrap())
            .unwrap();
        assert_eq!(restaurant.rating_total, 9);

        restaurant.remove_rating(Rating::new(4).unwrap()).unwrap();
        assert_eq!(restaurant.review_count, 1);
        assert_eq!(restaurant.rating_total, 5);
    }

    #[test]
    fn test_reaction_kind_storage() {
        assert_eq!(ReactionKind::parse("LIKE").unwrap(), ReactionKind::Like);
        assert_eq!(ReactionKind::Dislike.as_str(), "DISLIKE");
        assert!(ReactionKind::parse("MEH").is_err());
    }
}
