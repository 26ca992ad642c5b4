//! # Tastebud Content
//!
//! Reviews, reactions, posts and comments, mutated under named locks.
//!
//! Every mutation that touches a shared aggregate (a restaurant's rating, a
//! target's like/dislike counters, a post's comment count, a member's single
//! review or reaction) runs through the protected executor, holding the lock
//! keys of exactly the resources it reads and writes:
//!
//! | Operation | Keys |
//! |-----------|------|
//! | create / update review | `review-restaurant-<restaurant>` |
//! | delete review | `review-<id>`, `review-restaurant-<restaurant>`, `reaction-review-<id>` |
//! | toggle review reaction | `reaction-review-<id>` |
//! | toggle post reaction | `reaction-post-<id>` |
//! | delete post | `reaction-post-<id>`, `comment-post-<id>` |
//! | create comment | `comment-post-<post>` |
//! | update comment | `comment-<id>` |
//! | delete comment | `comment-post-<post>`, `comment-<id>` |
//!
//! ## Example
//!
//! ```ignore
//! use tastebud_content::{ContentEnvironment, ReactionService};
//! use tastebud_content::state::ReactionKind;
//!
//! let env = ContentEnvironment::new(store, coordinator, bounds, config, clock);
//! let reactions = ReactionService::new(env);
//!
//! let outcome = reactions
//!     .toggle_review_reaction(member_id, review_id, ReactionKind::Like)
//!     .await?;
//! assert_eq!(outcome.counters.like_count, 1);
//! ```

pub mod config;
pub mod environment;
pub mod error;
pub mod keys;
pub mod operations;
pub mod providers;
pub mod reaction;
pub mod state;

#[cfg(feature = "test-utils")]
pub mod mocks;

#[cfg(feature = "postgres")]
pub mod stores;

pub use config::ContentConfig;
pub use environment::ContentEnvironment;
pub use error::{ContentError, Outcome, Result};
pub use operations::{
    CommentService, PostService, ReactionOutcome, ReactionService, ReviewService,
};
pub use providers::ContentStore;
pub use reaction::{Change, ReactionState, Transition};
