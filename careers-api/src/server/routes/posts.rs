use crate::server::{
    Result, ServerError, ServerRouter,
    extract::{Fields, Query},
    json::Json,
    media::MediaStore,
};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use careers_common::model::{
    Id,
    post::{CreatePost, LikeResponse, LikeStatus, Post, PostMarker, UpdatePost},
    text::Username,
};
use careers_db::client::DbClient;
use serde::Deserialize;
use std::sync::Arc;
use tokio::task;
use tracing::debug;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(list_posts)
        .typed_post(create_post)
        .typed_patch(update_post)
        .typed_delete(delete_post)
        .typed_post(like_post)
        .typed_post(unlike_post)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/careers/", rejection(ServerError))]
struct PostsPath();

#[derive(TypedPath, Deserialize)]
#[typed_path("/careers/{id}/", rejection(ServerError))]
struct PostPath {
    id: Id<PostMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/careers/{id}/like/", rejection(ServerError))]
struct LikePostPath {
    id: Id<PostMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/careers/{id}/unlike/", rejection(ServerError))]
struct UnlikePostPath {
    id: Id<PostMarker>,
}

#[derive(Deserialize)]
struct ListPostsQuery {
    username: Option<String>,
}

async fn list_posts(
    PostsPath(): PostsPath,
    State(db): State<Arc<DbClient>>,
    Query(query): Query<ListPostsQuery>,
) -> Result<Json<Vec<Post>>> {
    let posts = match query.username.filter(|username| !username.is_empty()) {
        None => db.fetch_posts(None).await?,
        Some(username) => match Username::new(username) {
            Ok(username) => db.fetch_posts(Some(&username)).await?,
            // No stored username is blank or over-long, so nothing can match.
            Err(_) => Vec::new(),
        },
    };

    Ok(Json(posts))
}

async fn create_post(
    PostsPath(): PostsPath,
    State(db): State<Arc<DbClient>>,
    State(media): State<Arc<MediaStore>>,
    Fields(fields): Fields,
) -> Result<(StatusCode, Json<Post>)> {
    // Image uploads are decoded in full.
    let post = task::spawn_blocking(move || CreatePost::from_fields(fields)).await??;

    let image = match &post.image {
        Some(upload) => Some(media.store_post_image(upload).await?),
        None => None,
    };
    let post = match db.create_post(&post.with_image(image.clone())).await {
        Ok(post) => post,
        Err(err) => {
            if let Some(image) = &image {
                media.discard(image).await;
            }
            return Err(err.into());
        }
    };

    debug!(post_id = %post.id, "Created post {post}");
    Ok((StatusCode::CREATED, Json(post)))
}

async fn update_post(
    PostPath { id }: PostPath,
    State(db): State<Arc<DbClient>>,
    State(media): State<Arc<MediaStore>>,
    Fields(fields): Fields,
) -> Result<Json<Post>> {
    if !db.post_exists(id).await? {
        return Err(ServerError::PostByIdNotFound(id));
    }

    let update = task::spawn_blocking(move || UpdatePost::from_fields(fields)).await??;

    let image = match &update.image {
        Some(Some(upload)) => Some(Some(media.store_post_image(upload).await?)),
        Some(None) => Some(None),
        None => None,
    };
    let stored = image.clone().flatten();
    let updated = db
        .update_post(id, &update.with_image(image))
        .await
        .map_err(ServerError::from)
        .and_then(|post| post.ok_or(ServerError::PostByIdNotFound(id)));

    let post = match updated {
        Ok(post) => post,
        Err(err) => {
            // Also covers the post being deleted since the existence check.
            if let Some(image) = &stored {
                media.discard(image).await;
            }
            return Err(err);
        }
    };

    debug!(post_id = %id, "Updated post {post}");
    Ok(Json(post))
}

async fn delete_post(
    PostPath { id }: PostPath,
    State(db): State<Arc<DbClient>>,
) -> Result<StatusCode> {
    let deleted_comments = db
        .delete_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    debug!(post_id = %id, deleted_comments, "Deleted post");
    Ok(StatusCode::NO_CONTENT)
}

async fn like_post(
    LikePostPath { id }: LikePostPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<LikeResponse>> {
    let likes = db
        .like_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(Json(LikeResponse {
        status: LikeStatus::Liked,
        likes,
    }))
}

async fn unlike_post(
    UnlikePostPath { id }: UnlikePostPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<LikeResponse>> {
    let likes = db
        .unlike_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(Json(LikeResponse {
        status: LikeStatus::Unliked,
        likes,
    }))
}
