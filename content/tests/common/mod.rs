//! Shared fixtures for the content integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;
use tastebud_content::mocks::InMemoryContentStore;
use tastebud_content::state::{MemberId, Post, Restaurant, RestaurantId};
use tastebud_content::{
    CommentService, ContentConfig, ContentEnvironment, ContentStore, PostService,
    ReactionService, ReviewService,
};
use tastebud_core::TransactionManager;
use tastebud_core::lock::LockBounds;
use tastebud_runtime::LockCoordinator;
use tastebud_testing::{InMemoryLockStore, init_tracing, test_clock};

pub type Env = ContentEnvironment<InMemoryContentStore, InMemoryLockStore>;

/// Services wired to one in-memory content store and one lock store.
pub struct Harness {
    pub store: InMemoryContentStore,
    pub locks: InMemoryLockStore,
    pub reviews: ReviewService<InMemoryContentStore, InMemoryLockStore>,
    pub reactions: ReactionService<InMemoryContentStore, InMemoryLockStore>,
    pub posts: PostService<InMemoryContentStore, InMemoryLockStore>,
    pub comments: CommentService<InMemoryContentStore, InMemoryLockStore>,
}

impl Harness {
    /// Generous bounds, no read latency.
    pub fn new() -> Self {
        Self::with(
            LockBounds::new(Duration::from_secs(10), Duration::from_secs(10)),
            Duration::ZERO,
        )
    }

    /// Custom bounds and read latency.
    pub fn with(bounds: LockBounds, latency: Duration) -> Self {
        init_tracing();
        let store = InMemoryContentStore::new().with_latency(latency);
        let locks = InMemoryLockStore::new();
        let env: Env = ContentEnvironment::new(
            store.clone(),
            LockCoordinator::new(Arc::new(locks.clone())),
            bounds,
            ContentConfig::default().with_max_content_len(200),
            Arc::new(test_clock()),
        );

        Self {
            store,
            locks,
            reviews: ReviewService::new(env.clone()),
            reactions: ReactionService::new(env.clone()),
            posts: PostService::new(env.clone()),
            comments: CommentService::new(env),
        }
    }

    /// Commit a fresh restaurant.
    pub async fn restaurant(&self) -> RestaurantId {
        let restaurant = Restaurant::new("Chez Test");
        let mut tx = self.store.begin().await.unwrap();
        self.store.insert_restaurant(&mut tx, &restaurant).await.unwrap();
        self.store.commit(tx).await.unwrap();
        restaurant.id
    }

    /// Publish a post by a fresh member.
    pub async fn post(&self) -> Post {
        self.posts
            .create_post(MemberId::new(), "Best ramen in town", "Go early.")
            .await
            .unwrap()
    }
}
