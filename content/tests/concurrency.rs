//! Concurrent mutations of shared aggregates.
//!
//! The in-memory store sleeps before every read, so without the locks these
//! interleavings would lose updates.
//!
//! Run with: `cargo test -p tastebud-content --test concurrency`

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::Harness;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tastebud_content::state::{MemberId, ReactionKind, ReactionTarget};
use tastebud_content::{ContentError, ContentStore, ReactionState};
use tastebud_core::TransactionManager;
use tastebud_core::lock::LockBounds;

fn contended() -> Arc<Harness> {
    Arc::new(Harness::with(
        LockBounds::new(Duration::from_secs(30), Duration::from_secs(30)),
        Duration::from_millis(2),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_reactions_keep_counters_exact() {
    let h = contended();
    let restaurant_id = h.restaurant().await;
    let review = h
        .reviews
        .create_review(MemberId::new(), restaurant_id, 5, "Superb")
        .await
        .unwrap();

    let likes = 20;
    let dislikes = 5;
    let tasks = (0..likes + dislikes).map(|i| {
        let h = Arc::clone(&h);
        let kind = if i < likes {
            ReactionKind::Like
        } else {
            ReactionKind::Dislike
        };
        tokio::spawn(async move {
            h.reactions
                .toggle_review_reaction(MemberId::new(), review.id, kind)
                .await
        })
    });

    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let stored = h.store.review(review.id).unwrap();
    assert_eq!(stored.counters.like_count, likes);
    assert_eq!(stored.counters.dislike_count, dislikes);

    let target = ReactionTarget::Review(review.id);
    let mut tx = h.store.begin().await.unwrap();
    let counted_likes = h
        .store
        .count_reactions(&mut tx, target, ReactionKind::Like)
        .await
        .unwrap();
    let counted_dislikes = h
        .store
        .count_reactions(&mut tx, target, ReactionKind::Dislike)
        .await
        .unwrap();
    h.store.rollback(tx).await.unwrap();
    assert_eq!(counted_likes, likes);
    assert_eq!(counted_dislikes, dislikes);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_first_reviews_admit_exactly_one() {
    let h = contended();
    let restaurant_id = h.restaurant().await;
    let member = MemberId::new();

    let tasks = (0..10u8).map(|i| {
        let h = Arc::clone(&h);
        tokio::spawn(async move {
            h.reviews
                .create_review(member, restaurant_id, i % 5 + 1, "Racing")
                .await
        })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let created = results.iter().filter(|r| r.is_ok()).count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(ContentError::AlreadyReviewed { .. })))
        .count();
    assert_eq!(created, 1);
    assert_eq!(refused, 9);

    let reviews = h.store.reviews_of(restaurant_id);
    assert_eq!(reviews.len(), 1);
    let restaurant = h.store.restaurant(restaurant_id).unwrap();
    assert_eq!(restaurant.review_count, 1);
    assert_eq!(restaurant.rating_total, u64::from(reviews[0].rating.value()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_repeated_toggles_by_one_member_cancel_out() {
    let h = contended();
    let post = h.post().await;
    let member = MemberId::new();

    let tasks = (0..10).map(|_| {
        let h = Arc::clone(&h);
        tokio::spawn(async move {
            h.reactions
                .toggle_post_reaction(member, post.id, ReactionKind::Like)
                .await
        })
    });
    let outcomes: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    let liked = outcomes
        .iter()
        .filter(|o| o.state == ReactionState::Liked)
        .count();
    assert_eq!(liked, 5);

    let stored = h.store.post(post.id).unwrap();
    assert_eq!(stored.counters.like_count, 0);
    assert_eq!(stored.counters.dislike_count, 0);
    assert!(h.store.reactions_on(ReactionTarget::Post(post.id)).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_alternating_kinds_never_go_negative() {
    let h = contended();
    let post = h.post().await;
    let members: Vec<MemberId> = (0..4).map(|_| MemberId::new()).collect();

    let tasks = (0..32).map(|i| {
        let h = Arc::clone(&h);
        let member = members[i % members.len()];
        let kind = if i % 3 == 0 {
            ReactionKind::Dislike
        } else {
            ReactionKind::Like
        };
        tokio::spawn(async move { h.reactions.toggle_post_reaction(member, post.id, kind).await })
    });

    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let stored = h.store.post(post.id).unwrap();
    let live = h.store.reactions_on(ReactionTarget::Post(post.id));
    let live_likes = live.iter().filter(|r| r.kind == ReactionKind::Like).count() as u64;
    let live_dislikes = live.len() as u64 - live_likes;
    assert_eq!(stored.counters.like_count, live_likes);
    assert_eq!(stored.counters.dislike_count, live_dislikes);
    assert!(live.len() <= members.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_comments_are_all_counted() {
    let h = contended();
    let post = h.post().await;

    let tasks = (0..16).map(|i| {
        let h = Arc::clone(&h);
        tokio::spawn(async move {
            h.comments
                .create_comment(MemberId::new(), post.id, &format!("Comment {i}"))
                .await
        })
    });

    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert_eq!(h.store.post(post.id).unwrap().comment_count, 16);
    assert_eq!(h.store.comments_of(post.id).len(), 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_review_edit_and_reactions_do_not_clobber_each_other() {
    let h = contended();
    let restaurant_id = h.restaurant().await;
    let author = MemberId::new();
    let review = h
        .reviews
        .create_review(author, restaurant_id, 3, "First impressions")
        .await
        .unwrap();

    let edit = {
        let h = Arc::clone(&h);
        tokio::spawn(async move {
            h.reviews
                .update_review(author, review.id, 4, "Better the second time")
                .await
                .map(|_| ())
        })
    };
    let likes = (0..10).map(|_| {
        let h = Arc::clone(&h);
        tokio::spawn(async move {
            h.reactions
                .toggle_review_reaction(MemberId::new(), review.id, ReactionKind::Like)
                .await
                .map(|_| ())
        })
    });

    edit.await.unwrap().unwrap();
    for result in join_all(likes).await {
        result.unwrap().unwrap();
    }

    let stored = h.store.review(review.id).unwrap();
    assert_eq!(stored.content, "Better the second time");
    assert_eq!(stored.rating.value(), 4);
    assert_eq!(stored.counters.like_count, 10);
    assert_eq!(h.store.restaurant(restaurant_id).unwrap().rating_total, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_comment_edit_racing_post_deletion_never_reports_lost_write() {
    let h = Arc::new(Harness::with(
        LockBounds::new(Duration::from_secs(30), Duration::from_secs(30)),
        Duration::from_millis(5),
    ));

    for round in 0..10 {
        let author = MemberId::new();
        let commenter = MemberId::new();
        let post = h
            .posts
            .create_post(author, "Late night eats", "Where to?")
            .await
            .unwrap();
        let comment = h
            .comments
            .create_comment(commenter, post.id, "The diner on 5th")
            .await
            .unwrap();

        let edit = {
            let h = Arc::clone(&h);
            tokio::spawn(async move {
                h.comments
                    .update_comment(commenter, comment.id, "The diner on 6th")
                    .await
            })
        };
        let delete = {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.posts.delete_post(author, post.id).await })
        };

        delete.await.unwrap().unwrap();
        match edit.await.unwrap() {
            Ok(edited) => assert_eq!(edited.content, "The diner on 6th"),
            Err(ContentError::NotFound { resource: "comment", .. }) => {}
            Err(other) => panic!("round {round}: unexpected edit outcome {other:?}"),
        }

        assert!(h.store.post(post.id).is_none());
        assert!(h.store.comment(comment.id).is_none());
    }
}
