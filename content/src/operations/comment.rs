//! Comment operations.
//!
//! Creation is guarded by the parent post's comment key. Edits and deletions
//! take both the post's comment key and the comment's own key: the post key
//! excludes `delete_post`, which removes every comment of the post, and the
//! comment key excludes other edits. Ownership is verified under the locks.

use crate::environment::ContentEnvironment;
use crate::error::{ContentError, Result};
use crate::keys;
use crate::operations::validate_text;
use crate::providers::ContentStore;
use crate::state::{Comment, CommentId, MemberId, PostId};
use tastebud_core::lock::LockStore;

/// Create, edit and delete comments on posts.
pub struct CommentService<S: ContentStore, L: LockStore> {
    env: ContentEnvironment<S, L>,
}

impl<S: ContentStore, L: LockStore> Clone for CommentService<S, L> {
    fn clone(&self) -> Self {
        Self {
            env: self.env.clone(),
        }
    }
}

impl<S: ContentStore, L: LockStore> CommentService<S, L> {
    /// Create a new comment service.
    #[must_use]
    pub const fn new(env: ContentEnvironment<S, L>) -> Self {
        Self { env }
    }

    /// Comment on a post.
    ///
    /// # Errors
    ///
    /// - [`ContentError::InvalidContent`]
    /// - [`ContentError::NotFound`] if the post does not exist
    /// - not-executed errors if the post's comments stayed locked
    pub async fn create_comment(
        &self,
        member_id: MemberId,
        post_id: PostId,
        content: &str,
    ) -> Result<Comment> {
        let content = validate_text("content", content, self.env.config.max_content_len)?;
        let store = self.env.store.clone();
        let now = self.env.clock.now();

        let comment = self
            .env
            .protected(keys::post_comment_key(post_id), move |tx| {
                Box::pin(async move {
                    let post = store
                        .find_post(tx, post_id)
                        .await?
                        .ok_or_else(|| ContentError::not_found("post", post_id))?;

                    let comment = Comment {
                        id: CommentId::new(),
                        post_id,
                        member_id,
                        content,
                        created_at: now,
                        updated_at: now,
                    };
                    store.insert_comment(tx, &comment).await?;

                    let count = post
                        .comment_count
                        .checked_add(1)
                        .ok_or(ContentError::CounterUnderflow { counter: "comment_count" })?;
                    store.update_comment_count(tx, post_id, count).await?;
                    Ok(comment)
                })
            })
            .await?;

        tracing::info!(comment_id = %comment.id, post_id = %post_id, member_id = %member_id, "Comment created");
        Ok(comment)
    }

    /// Replace the text of the member's own comment.
    ///
    /// # Errors
    ///
    /// - [`ContentError::InvalidContent`]
    /// - [`ContentError::NotFound`] if the comment does not exist
    /// - [`ContentError::NotOwner`] if someone else wrote it
    /// - not-executed errors if either key stayed locked
    pub async fn update_comment(
        &self,
        member_id: MemberId,
        comment_id: CommentId,
        content: &str,
    ) -> Result<Comment> {
        let content = validate_text("content", content, self.env.config.max_content_len)?;
        let post_id = self.post_of(comment_id).await?;
        let store = self.env.store.clone();
        let now = self.env.clock.now();
        let locks = vec![keys::post_comment_key(post_id), keys::comment_key(comment_id)];

        let comment = self
            .env
            .protected_all(locks, move |tx| {
                Box::pin(async move {
                    let mut comment = store
                        .find_comment(tx, comment_id)
                        .await?
                        .ok_or_else(|| ContentError::not_found("comment", comment_id))?;
                    if comment.member_id != member_id {
                        return Err(ContentError::NotOwner { resource: "comment" });
                    }

                    store
                        .update_comment_content(tx, comment_id, &content, now)
                        .await?;
                    comment.content = content;
                    comment.updated_at = now;
                    Ok(comment)
                })
            })
            .await?;

        tracing::info!(comment_id = %comment_id, post_id = %post_id, member_id = %member_id, "Comment updated");
        Ok(comment)
    }

    /// Delete the member's own comment.
    ///
    /// # Errors
    ///
    /// - [`ContentError::NotFound`] if the comment does not exist
    /// - [`ContentError::NotOwner`] if someone else wrote it
    /// - [`ContentError::CounterUnderflow`] if the post's `comment_count` is
    ///   already zero
    /// - not-executed errors if either key stayed locked
    pub async fn delete_comment(&self, member_id: MemberId, comment_id: CommentId) -> Result<()> {
        let post_id = self.post_of(comment_id).await?;
        let store = self.env.store.clone();
        let locks = vec![keys::post_comment_key(post_id), keys::comment_key(comment_id)];

        self.env
            .protected_all(locks, move |tx| {
                Box::pin(async move {
                    let comment = store
                        .find_comment(tx, comment_id)
                        .await?
                        .ok_or_else(|| ContentError::not_found("comment", comment_id))?;
                    if comment.member_id != member_id {
                        return Err(ContentError::NotOwner { resource: "comment" });
                    }

                    store.delete_comment(tx, comment_id).await?;

                    if let Some(post) = store.find_post(tx, post_id).await? {
                        let count = post
                            .comment_count
                            .checked_sub(1)
                            .ok_or(ContentError::CounterUnderflow { counter: "comment_count" })?;
                        store.update_comment_count(tx, post_id, count).await?;
                    }
                    Ok(())
                })
            })
            .await?;

        tracing::info!(comment_id = %comment_id, post_id = %post_id, member_id = %member_id, "Comment deleted");
        Ok(())
    }

    /// Parent post of a comment, read outside any lock. A comment never moves.
    async fn post_of(&self, comment_id: CommentId) -> Result<PostId> {
        let store = self.env.store.clone();
        self.env
            .lookup(move |tx| {
                Box::pin(async move {
                    store
                        .find_comment(tx, comment_id)
                        .await?
                        .map(|comment| comment.post_id)
                        .ok_or_else(|| ContentError::not_found("comment", comment_id))
                })
            })
            .await
    }
}
