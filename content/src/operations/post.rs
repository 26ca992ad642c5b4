//! Post operations.

use crate::environment::ContentEnvironment;
use crate::error::{ContentError, Result};
use crate::keys;
use crate::operations::validate_text;
use crate::providers::ContentStore;
use crate::state::{Counters, MemberId, Post, PostId, ReactionTarget};
use tastebud_core::lock::LockStore;

/// Maximum title length, in characters.
const MAX_TITLE_LEN: usize = 200;

/// Create and delete community posts.
pub struct PostService<S: ContentStore, L: LockStore> {
    env: ContentEnvironment<S, L>,
}

impl<S: ContentStore, L: LockStore> Clone for PostService<S, L> {
    fn clone(&self) -> Self {
        Self {
            env: self.env.clone(),
        }
    }
}

impl<S: ContentStore, L: LockStore> PostService<S, L> {
    /// Create a new post service.
    #[must_use]
    pub const fn new(env: ContentEnvironment<S, L>) -> Self {
        Self { env }
    }

    /// Publish a post.
    ///
    /// A new post has no contending writers, so it is inserted in its own
    /// transaction without a lock.
    ///
    /// # Errors
    ///
    /// - [`ContentError::InvalidContent`] for a blank or oversized title or
    ///   body
    /// - [`ContentError::Database`] if the insert cannot be committed
    pub async fn create_post(&self, member_id: MemberId, title: &str, content: &str) -> Result<Post> {
        let title = validate_text("title", title, MAX_TITLE_LEN)?;
        let content = validate_text("content", content, self.env.config.max_content_len)?;
        let now = self.env.clock.now();

        let post = Post {
            id: PostId::new(),
            member_id,
            title,
            content,
            counters: Counters::default(),
            comment_count: 0,
            created_at: now,
            updated_at: now,
        };

        let store = &self.env.store;
        let mut tx = store.begin().await?;
        if let Err(err) = store.insert_post(&mut tx, &post).await {
            if let Err(rollback) = store.rollback(tx).await {
                tracing::error!(error = %rollback, "Rollback reported a failure");
            }
            return Err(err);
        }
        store.commit(tx).await?;

        tracing::info!(post_id = %post.id, member_id = %member_id, "Post created");
        Ok(post)
    }

    /// Delete the member's own post with its comments and reactions.
    ///
    /// Holds the post's reaction and comment keys, so no toggle or comment
    /// on the post is in flight while it goes.
    ///
    /// # Errors
    ///
    /// - [`ContentError::NotFound`] if the post does not exist
    /// - [`ContentError::NotOwner`] if someone else wrote it
    /// - not-executed errors if either key stayed locked
    pub async fn delete_post(&self, member_id: MemberId, post_id: PostId) -> Result<()> {
        let store = self.env.store.clone();
        let locks = vec![keys::post_reaction_key(post_id), keys::post_comment_key(post_id)];

        let (comments, reactions) = self
            .env
            .protected_all(locks, move |tx| {
                Box::pin(async move {
                    let post = store
                        .find_post(tx, post_id)
                        .await?
                        .ok_or_else(|| ContentError::not_found("post", post_id))?;
                    if post.member_id != member_id {
                        return Err(ContentError::NotOwner { resource: "post" });
                    }

                    let comments = store.delete_comments_of_post(tx, post_id).await?;
                    let reactions = store
                        .delete_reactions_of(tx, ReactionTarget::Post(post_id))
                        .await?;
                    store.delete_post(tx, post_id).await?;
                    Ok((comments, reactions))
                })
            })
            .await?;

        tracing::info!(
            post_id = %post_id,
            member_id = %member_id,
            removed_comments = comments,
            removed_reactions = reactions,
            "Post deleted"
        );

        Ok(())
    }
}
