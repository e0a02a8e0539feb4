use crate::server::{Result, ServerError, ServerRouter, extract::Fields, json::Json};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use careers_common::model::{
    Id,
    comment::{Comment, CreateComment},
    post::PostMarker,
};
use careers_db::client::DbClient;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_post(create_comment)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/careers/{id}/comments/", rejection(ServerError))]
struct PostCommentsPath {
    id: Id<PostMarker>,
}

async fn create_comment(
    PostCommentsPath { id: post_id }: PostCommentsPath,
    State(db): State<Arc<DbClient>>,
    Fields(fields): Fields,
) -> Result<(StatusCode, Json<Comment>)> {
    let comment = CreateComment::from_fields(fields)?;
    let comment = db
        .create_comment(post_id, &comment)
        .await?
        .ok_or(ServerError::PostByIdNotFound(post_id))?;

    debug!(%post_id, comment_id = %comment.id, username = %comment.username, "Created comment");
    Ok((StatusCode::CREATED, Json(comment)))
}
