use crate::record::{CommentRecord, PostRecord, now, timestamp_to_db};
use careers_common::{
    model::{
        CareersSnowflakeGenerator, Id, ModelValidationError,
        comment::{Comment, CommentMarker, CreateComment},
        image::StoredImage,
        post::{CreatePost, Post, PostMarker, UpdatePost},
        text::Username,
    },
    snowflake::{ProcessId, SnowflakeTimestampError, WorkerId},
};
use sqlx::{
    SqliteConnection, SqlitePool,
    migrate::MigrateError,
    query, query_as, query_scalar,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::{
    collections::HashMap,
    str::FromStr,
    sync::{Mutex, PoisonError},
};
use thiserror::Error;
use tracing::{debug, info};

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("Could not generate an id: {0}")]
    IdGeneration(#[from] SnowflakeTimestampError),
    #[error("Applying migrations failed: {0}")]
    Migrate(#[from] MigrateError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

const POST_COLUMNS: &str = "id, username, title, content, created_datetime, likes, image";
const COMMENT_COLUMNS: &str = "id, post_id, username, content, created_datetime";

#[derive(Debug)]
pub struct DbClient {
    pool: SqlitePool,
    snowflake_generator: Mutex<CareersSnowflakeGenerator>,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: SqlitePool, worker_id: WorkerId, process_id: ProcessId) -> Self {
        let snowflake_generator = Mutex::new(CareersSnowflakeGenerator::new(worker_id, process_id));

        Self {
            pool,
            snowflake_generator,
        }
    }

    /// Opens (creating if needed) the database at `url` and applies pending
    /// migrations.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        worker_id: WorkerId,
        process_id: ProcessId,
    ) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let client = Self::new(pool, worker_id, process_id);
        client.migrate().await?;
        info!(url, max_connections, "Connected to database");

        Ok(client)
    }

    /// A fresh private database that lives as long as the client.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        // Every connection to `:memory:` is its own database, so keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let client = Self::new(pool, WorkerId::default(), ProcessId::default());
        client.migrate().await?;

        Ok(client)
    }

    /// Closes the pool once checked-out connections are returned. Later calls fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }

    fn next_id<Marker>(&self) -> Result<Id<Marker>> {
        let snowflake = self
            .snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()?;

        Ok(snowflake.into())
    }

    /// Newest first, each post with its comments.
    pub async fn fetch_posts(&self, username: Option<&Username>) -> Result<Vec<Post>> {
        let username = username.map(Username::get);
        let mut tx = self.pool.begin().await?;

        let records = query_as::<_, PostRecord>(&format!(
            "
            SELECT {POST_COLUMNS}
            FROM posts
            WHERE ?1 IS NULL OR username = ?1
            ORDER BY created_datetime DESC, id DESC
            "
        ))
        .bind(username)
        .fetch_all(&mut *tx)
        .await?;

        let comment_records = query_as::<_, CommentRecord>(
            "
            SELECT
                comments.id,
                comments.post_id,
                comments.username,
                comments.content,
                comments.created_datetime
            FROM
                comments JOIN posts ON posts.id = comments.post_id
            WHERE
                ?1 IS NULL OR posts.username = ?1
            ORDER BY
                comments.created_datetime, comments.id
            ",
        )
        .bind(username)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut comments_by_post: HashMap<i64, Vec<Comment>> = HashMap::new();
        for record in comment_records {
            comments_by_post
                .entry(record.post_id)
                .or_default()
                .push(record.try_into()?);
        }

        let posts = records
            .into_iter()
            .map(|record| {
                let comments = comments_by_post.remove(&record.id).unwrap_or_default();
                record.into_post(comments)
            })
            .collect::<Result<_, _>>()?;

        Ok(posts)
    }

    pub async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let mut connection = self.pool.acquire().await?;
        fetch_post(&mut connection, post_id).await
    }

    pub async fn post_exists(&self, post_id: Id<PostMarker>) -> Result<bool> {
        let found = query_scalar::<_, i64>("SELECT id FROM posts WHERE id = ?1")
            .bind(post_id.to_db())
            .fetch_optional(&self.pool)
            .await?;

        Ok(found.is_some())
    }

    pub async fn create_post(&self, post: &CreatePost<StoredImage>) -> Result<Post> {
        let post_id = self.next_id::<PostMarker>()?;

        let record = query_as::<_, PostRecord>(&format!(
            "
            INSERT INTO posts (id, username, title, content, created_datetime, likes, image)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
            RETURNING {POST_COLUMNS}
            "
        ))
        .bind(post_id.to_db())
        .bind(post.username.get())
        .bind(post.title.get())
        .bind(post.content.get())
        .bind(timestamp_to_db(now()))
        .bind(post.image.as_ref().map(StoredImage::name))
        .fetch_one(&self.pool)
        .await?;

        debug!(%post_id, "Inserted post");
        Ok(record.into_post(Vec::new())?)
    }

    /// Writes only the fields present in `update`. Likes are never touched, so
    /// a concurrent like is not overwritten. `None` if the post does not exist.
    pub async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        update: &UpdatePost<StoredImage>,
    ) -> Result<Option<Post>> {
        let mut tx = self.pool.begin().await?;

        let updated = query(
            "
            UPDATE posts SET
                username = COALESCE(?2, username),
                title = COALESCE(?3, title),
                content = COALESCE(?4, content),
                image = CASE WHEN ?5 THEN ?6 ELSE image END
            WHERE id = ?1
            ",
        )
        .bind(post_id.to_db())
        .bind(update.username.as_ref().map(Username::get))
        .bind(update.title.as_ref().map(|title| title.get()))
        .bind(update.content.as_ref().map(|content| content.get()))
        .bind(update.image.is_some())
        .bind(update.image.as_ref().and_then(|image| image.as_ref().map(StoredImage::name)))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Ok(None);
        }

        let post = fetch_post(&mut tx, post_id).await?;
        tx.commit().await?;

        debug!(%post_id, "Updated post");
        Ok(post)
    }

    /// Deletes the post together with every comment it owns. Returns the
    /// number of deleted comments, or `None` if the post does not exist.
    pub async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<Option<u64>> {
        let mut tx = self.pool.begin().await?;

        let deleted_comments = query("DELETE FROM comments WHERE post_id = ?1")
            .bind(post_id.to_db())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let deleted_posts = query("DELETE FROM posts WHERE id = ?1")
            .bind(post_id.to_db())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted_posts == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;

        debug!(%post_id, deleted_comments, "Deleted post");
        Ok(Some(deleted_comments))
    }

    /// Atomically adds one like. `None` if the post does not exist.
    pub async fn like_post(&self, post_id: Id<PostMarker>) -> Result<Option<u32>> {
        self.update_likes(post_id, "likes + 1").await
    }

    /// Atomically removes one like, never going below zero.
    pub async fn unlike_post(&self, post_id: Id<PostMarker>) -> Result<Option<u32>> {
        self.update_likes(post_id, "MAX(likes - 1, 0)").await
    }

    async fn update_likes(&self, post_id: Id<PostMarker>, new_value: &str) -> Result<Option<u32>> {
        let likes = query_scalar::<_, i64>(&format!(
            "UPDATE posts SET likes = {new_value} WHERE id = ?1 RETURNING likes"
        ))
        .bind(post_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        likes
            .map(|likes| u32::try_from(likes).map_err(|_| ModelValidationError::Likes(likes)))
            .transpose()
            .map_err(DbError::from)
    }

    /// `None` if the post does not exist. The existence check and the insert
    /// are one statement.
    pub async fn create_comment(
        &self,
        post_id: Id<PostMarker>,
        comment: &CreateComment,
    ) -> Result<Option<Comment>> {
        let comment_id = self.next_id::<CommentMarker>()?;

        let record = query_as::<_, CommentRecord>(&format!(
            "
            INSERT INTO comments (id, post_id, username, content, created_datetime)
            SELECT ?1, posts.id, ?3, ?4, ?5 FROM posts WHERE posts.id = ?2
            RETURNING {COMMENT_COLUMNS}
            "
        ))
        .bind(comment_id.to_db())
        .bind(post_id.to_db())
        .bind(comment.username.get())
        .bind(comment.content.get())
        .bind(timestamp_to_db(now()))
        .fetch_optional(&self.pool)
        .await?;

        let comment = record.map(Comment::try_from).transpose()?;
        if comment.is_some() {
            debug!(%post_id, %comment_id, "Inserted comment");
        }
        Ok(comment)
    }

    pub async fn fetch_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>> {
        let mut connection = self.pool.acquire().await?;
        fetch_comments(&mut connection, post_id).await
    }
}

async fn fetch_post(
    connection: &mut SqliteConnection,
    post_id: Id<PostMarker>,
) -> Result<Option<Post>> {
    let record = query_as::<_, PostRecord>(&format!(
        "SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"
    ))
    .bind(post_id.to_db())
    .fetch_optional(&mut *connection)
    .await?;

    let Some(record) = record else {
        return Ok(None);
    };

    let comments = fetch_comments(connection, post_id).await?;
    Ok(Some(record.into_post(comments)?))
}

async fn fetch_comments(
    connection: &mut SqliteConnection,
    post_id: Id<PostMarker>,
) -> Result<Vec<Comment>> {
    let records = query_as::<_, CommentRecord>(&format!(
        "
        SELECT {COMMENT_COLUMNS}
        FROM comments
        WHERE post_id = ?1
        ORDER BY created_datetime, id
        "
    ))
    .bind(post_id.to_db())
    .fetch_all(&mut *connection)
    .await?;

    let comments = records
        .into_iter()
        .map(Comment::try_from)
        .collect::<Result<_, _>>()?;
    Ok(comments)
}
