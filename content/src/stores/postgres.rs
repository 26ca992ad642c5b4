//! PostgreSQL content store.
//!
//! Every transaction is a fresh `sqlx` transaction checked out of the pool,
//! so a protected section never shares a connection with its caller.
//!
//! # Example
//!
//! ```no_run
//! use tastebud_content::ContentConfig;
//! use tastebud_content::stores::PostgresContentStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresContentStore::connect(&ContentConfig::from_env()).await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::ContentConfig;
use crate::error::{ContentError, Result};
use crate::providers::ContentStore;
use crate::state::{
    Comment, CommentId, Counters, MemberId, Post, PostId, Rating, Reaction, ReactionId,
    ReactionKind, ReactionTarget, Restaurant, RestaurantId, Review, ReviewId,
};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgQueryResult, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tastebud_core::{TransactionError, TransactionManager, transaction};

/// `SQLSTATE` of a unique constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL-backed [`ContentStore`].
#[derive(Clone)]
pub struct PostgresContentStore {
    pool: PgPool,
}

impl PostgresContentStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::Database`] if the database is unreachable.
    pub async fn connect(config: &ContentConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(|e| ContentError::Database(format!("Failed to connect: {e}")))?;

        tracing::info!(max_connections = config.max_connections, "Content store connected");
        Ok(Self { pool })
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ContentError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_restaurant(row: &PgRow) -> Result<Restaurant> {
        Ok(Restaurant {
            id: RestaurantId(row.get("id")),
            name: row.get("name"),
            review_count: from_db(row.get("review_count"))?,
            rating_total: from_db(row.get("rating_total"))?,
        })
    }

    fn row_to_review(row: &PgRow) -> Result<Review> {
        let rating: i16 = row.get("rating");
        let rating = u8::try_from(rating)
            .map_err(|_| ContentError::Database(format!("Stored rating out of range: {rating}")))?;

        Ok(Review {
            id: ReviewId(row.get("id")),
            restaurant_id: RestaurantId(row.get("restaurant_id")),
            member_id: MemberId(row.get("member_id")),
            rating: Rating::new(rating)?,
            content: row.get("content"),
            counters: Self::row_to_counters(row)?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn row_to_post(row: &PgRow) -> Result<Post> {
        Ok(Post {
            id: PostId(row.get("id")),
            member_id: MemberId(row.get("member_id")),
            title: row.get("title"),
            content: row.get("content"),
            counters: Self::row_to_counters(row)?,
            comment_count: from_db(row.get("comment_count"))?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn row_to_comment(row: &PgRow) -> Comment {
        Comment {
            id: CommentId(row.get("id")),
            post_id: PostId(row.get("post_id")),
            member_id: MemberId(row.get("member_id")),
            content: row.get("content"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    fn row_to_reaction(row: &PgRow) -> Result<Reaction> {
        let target_kind: String = row.get("target_kind");
        let target_id: uuid::Uuid = row.get("target_id");
        let target = match target_kind.as_str() {
            "REVIEW" => ReactionTarget::Review(ReviewId(target_id)),
            "POST" => ReactionTarget::Post(PostId(target_id)),
            other => {
                return Err(ContentError::Database(format!("Unknown reaction target: {other}")));
            }
        };
        let kind: String = row.get("kind");

        Ok(Reaction {
            id: ReactionId(row.get("id")),
            kind: ReactionKind::parse(&kind)?,
            target,
            member_id: MemberId(row.get("member_id")),
            created_at: row.get("created_at"),
        })
    }

    fn row_to_counters(row: &PgRow) -> Result<Counters> {
        Ok(Counters {
            like_count: from_db(row.get("like_count"))?,
            dislike_count: from_db(row.get("dislike_count"))?,
        })
    }
}

fn db_error(e: sqlx::Error) -> ContentError {
    ContentError::Database(e.to_string())
}

/// A targeted update that matched no row hit a deleted aggregate.
fn touched(result: &PgQueryResult, resource: &'static str, id: impl std::fmt::Display) -> Result<()> {
    if result.rows_affected() == 0 {
        return Err(ContentError::not_found(resource, id));
    }
    Ok(())
}

fn to_db(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| ContentError::Database(format!("Counter too large: {value}")))
}

fn from_db(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| ContentError::Database(format!("Negative counter: {value}")))
}

impl TransactionManager for PostgresContentStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> transaction::Result<Self::Tx> {
        self.pool
            .begin()
            .await
            .map_err(|e| TransactionError::Begin(e.to_string()))
    }

    async fn commit(&self, tx: Self::Tx) -> transaction::Result<()> {
        tx.commit()
            .await
            .map_err(|e| TransactionError::Commit(e.to_string()))
    }

    async fn rollback(&self, tx: Self::Tx) -> transaction::Result<()> {
        tx.rollback()
            .await
            .map_err(|e| TransactionError::Rollback(e.to_string()))
    }
}

impl ContentStore for PostgresContentStore {
    async fn insert_restaurant(&self, tx: &mut Self::Tx, restaurant: &Restaurant) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO restaurants (id, name, review_count, rating_total)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(restaurant.id.0)
        .bind(&restaurant.name)
        .bind(to_db(restaurant.review_count)?)
        .bind(to_db(restaurant.rating_total)?)
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn find_restaurant(
        &self,
        tx: &mut Self::Tx,
        id: RestaurantId,
    ) -> Result<Option<Restaurant>> {
        let row = sqlx::query(
            r"
            SELECT id, name, review_count, rating_total
            FROM restaurants
            WHERE id = $1
            ",
        )
        .bind(id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error)?;

        row.as_ref().map(Self::row_to_restaurant).transpose()
    }

    async fn update_restaurant_rating(
        &self,
        tx: &mut Self::Tx,
        id: RestaurantId,
        review_count: u64,
        rating_total: u64,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE restaurants SET review_count = $1, rating_total = $2 WHERE id = $3")
            .bind(to_db(review_count)?)
            .bind(to_db(rating_total)?)
            .bind(id.0)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        touched(&result, "restaurant", id)
    }

    async fn find_review(&self, tx: &mut Self::Tx, id: ReviewId) -> Result<Option<Review>> {
        let row = sqlx::query(
            r"
            SELECT id, restaurant_id, member_id, rating, content,
                   like_count, dislike_count, created_at, updated_at
            FROM reviews
            WHERE id = $1
            ",
        )
        .bind(id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error)?;

        row.as_ref().map(Self::row_to_review).transpose()
    }

    async fn find_review_by_author(
        &self,
        tx: &mut Self::Tx,
        restaurant_id: RestaurantId,
        member_id: MemberId,
    ) -> Result<Option<Review>> {
        let row = sqlx::query(
            r"
            SELECT id, restaurant_id, member_id, rating, content,
                   like_count, dislike_count, created_at, updated_at
            FROM reviews
            WHERE restaurant_id = $1 AND member_id = $2
            ",
        )
        .bind(restaurant_id.0)
        .bind(member_id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error)?;

        row.as_ref().map(Self::row_to_review).transpose()
    }

    async fn insert_review(&self, tx: &mut Self::Tx, review: &Review) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO reviews (
                id, restaurant_id, member_id, rating, content,
                like_count, dislike_count, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(review.id.0)
        .bind(review.restaurant_id.0)
        .bind(review.member_id.0)
        .bind(i16::from(review.rating.value()))
        .bind(&review.content)
        .bind(to_db(review.counters.like_count)?)
        .bind(to_db(review.counters.dislike_count)?)
        .bind(review.created_at)
        .bind(review.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            let unique = e
                .as_database_error()
                .and_then(|db| db.code())
                .is_some_and(|code| code == UNIQUE_VIOLATION);
            if unique {
                ContentError::AlreadyReviewed {
                    member_id: review.member_id,
                    restaurant_id: review.restaurant_id,
                }
            } else {
                db_error(e)
            }
        })?;
        Ok(())
    }

    async fn update_review_body(
        &self,
        tx: &mut Self::Tx,
        id: ReviewId,
        rating: Rating,
        content: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE reviews SET rating = $1, content = $2, updated_at = $3 WHERE id = $4")
            .bind(i16::from(rating.value()))
            .bind(content)
            .bind(updated_at)
            .bind(id.0)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        touched(&result, "review", id)
    }

    async fn update_review_counters(
        &self,
        tx: &mut Self::Tx,
        id: ReviewId,
        counters: Counters,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE reviews SET like_count = $1, dislike_count = $2 WHERE id = $3")
            .bind(to_db(counters.like_count)?)
            .bind(to_db(counters.dislike_count)?)
            .bind(id.0)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        touched(&result, "review", id)
    }

    async fn delete_review(&self, tx: &mut Self::Tx, id: ReviewId) -> Result<()> {
        sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id.0)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn find_post(&self, tx: &mut Self::Tx, id: PostId) -> Result<Option<Post>> {
        let row = sqlx::query(
            r"
            SELECT id, member_id, title, content, like_count, dislike_count,
                   comment_count, created_at, updated_at
            FROM posts
            WHERE id = $1
            ",
        )
        .bind(id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error)?;

        row.as_ref().map(Self::row_to_post).transpose()
    }

    async fn insert_post(&self, tx: &mut Self::Tx, post: &Post) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO posts (
                id, member_id, title, content, like_count, dislike_count,
                comment_count, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(post.id.0)
        .bind(post.member_id.0)
        .bind(&post.title)
        .bind(&post.content)
        .bind(to_db(post.counters.like_count)?)
        .bind(to_db(post.counters.dislike_count)?)
        .bind(to_db(post.comment_count)?)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn update_post_counters(
        &self,
        tx: &mut Self::Tx,
        id: PostId,
        counters: Counters,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE posts SET like_count = $1, dislike_count = $2 WHERE id = $3")
            .bind(to_db(counters.like_count)?)
            .bind(to_db(counters.dislike_count)?)
            .bind(id.0)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        touched(&result, "post", id)
    }

    async fn update_comment_count(
        &self,
        tx: &mut Self::Tx,
        id: PostId,
        comment_count: u64,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE posts SET comment_count = $1 WHERE id = $2")
            .bind(to_db(comment_count)?)
            .bind(id.0)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        touched(&result, "post", id)
    }

    async fn delete_post(&self, tx: &mut Self::Tx, id: PostId) -> Result<()> {
        sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id.0)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn find_comment(&self, tx: &mut Self::Tx, id: CommentId) -> Result<Option<Comment>> {
        let row = sqlx::query(
            r"
            SELECT id, post_id, member_id, content, created_at, updated_at
            FROM comments
            WHERE id = $1
            ",
        )
        .bind(id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error)?;

        Ok(row.as_ref().map(Self::row_to_comment))
    }

    async fn insert_comment(&self, tx: &mut Self::Tx, comment: &Comment) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO comments (id, post_id, member_id, content, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(comment.id.0)
        .bind(comment.post_id.0)
        .bind(comment.member_id.0)
        .bind(&comment.content)
        .bind(comment.created_at)
        .bind(comment.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn update_comment_content(
        &self,
        tx: &mut Self::Tx,
        id: CommentId,
        content: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE comments SET content = $1, updated_at = $2 WHERE id = $3")
            .bind(content)
            .bind(updated_at)
            .bind(id.0)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        touched(&result, "comment", id)
    }

    async fn delete_comment(&self, tx: &mut Self::Tx, id: CommentId) -> Result<()> {
        sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id.0)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn delete_comments_of_post(&self, tx: &mut Self::Tx, post_id: PostId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM comments WHERE post_id = $1")
            .bind(post_id.0)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected())
    }

    async fn find_reaction(
        &self,
        tx: &mut Self::Tx,
        target: ReactionTarget,
        member_id: MemberId,
    ) -> Result<Option<Reaction>> {
        let row = sqlx::query(
            r"
            SELECT id, target_kind, target_id, member_id, kind, created_at
            FROM reactions
            WHERE target_kind = $1 AND target_id = $2 AND member_id = $3
            ",
        )
        .bind(target.kind_str())
        .bind(target.uuid())
        .bind(member_id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error)?;

        row.as_ref().map(Self::row_to_reaction).transpose()
    }

    async fn insert_reaction(&self, tx: &mut Self::Tx, reaction: &Reaction) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO reactions (id, target_kind, target_id, member_id, kind, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(reaction.id.0)
        .bind(reaction.target.kind_str())
        .bind(reaction.target.uuid())
        .bind(reaction.member_id.0)
        .bind(reaction.kind.as_str())
        .bind(reaction.created_at)
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn update_reaction_kind(
        &self,
        tx: &mut Self::Tx,
        id: ReactionId,
        kind: ReactionKind,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE reactions SET kind = $1 WHERE id = $2")
            .bind(kind.as_str())
            .bind(id.0)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        touched(&result, "reaction", id)
    }

    async fn delete_reaction(&self, tx: &mut Self::Tx, id: ReactionId) -> Result<()> {
        sqlx::query("DELETE FROM reactions WHERE id = $1")
            .bind(id.0)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn delete_reactions_of(&self, tx: &mut Self::Tx, target: ReactionTarget) -> Result<u64> {
        let result = sqlx::query("DELETE FROM reactions WHERE target_kind = $1 AND target_id = $2")
            .bind(target.kind_str())
            .bind(target.uuid())
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected())
    }

    async fn count_reactions(
        &self,
        tx: &mut Self::Tx,
        target: ReactionTarget,
        kind: ReactionKind,
    ) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*)
            FROM reactions
            WHERE target_kind = $1 AND target_id = $2 AND kind = $3
            ",
        )
        .bind(target.kind_str())
        .bind(target.uuid())
        .bind(kind.as_str())
        .fetch_one(&mut **tx)
        .await
        .map_err(db_error)?;

        from_db(count)
    }
}
