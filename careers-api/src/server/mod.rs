use axum::{
    Router,
    extract::{
        DefaultBodyLimit, FromRef, Request,
        multipart::{MultipartError, MultipartRejection},
        rejection::{BytesRejection, FormRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use careers_common::model::{Id, form::ValidationErrors, post::PostMarker};
use careers_db::client::{DbClient, DbError};
use json::Json;
use media::MediaStore;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinError;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, warn};

mod extract;
mod json;
pub mod media;
mod routes;

#[cfg(test)]
mod tests;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, Debug, FromRef)]
pub struct ServerState {
    pub db_client: Arc<DbClient>,
    pub media: Arc<MediaStore>,
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

/// The complete application: api routes, stored media and request tracing.
pub fn app(state: ServerState, max_upload_bytes: usize) -> Router {
    let media_files = ServeDir::new(state.media.root());

    routes()
        .nest_service(media::MEDIA_PATH, media_files)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Request body rejected: {0}")]
    BodyRejection(#[from] BytesRejection),
    #[error("Form body rejected: {0}")]
    FormRejection(#[from] FormRejection),
    #[error("Multipart body rejected: {0}")]
    MultipartRejection(#[from] MultipartRejection),
    #[error("Multipart body could not be read: {0}")]
    Multipart(#[from] MultipartError),
    #[error("JSON parse error - {0}")]
    MalformedJson(serde_json::Error),
    #[error("Unsupported media type \"{0}\" in request.")]
    UnsupportedMediaType(String),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("Storing media failed: {0}")]
    Media(#[from] std::io::Error),
    #[error("Validation task failed: {0}")]
    ValidationTask(#[from] JoinError),
    #[error("Post with id {0} was not found.")]
    PostByIdNotFound(Id<PostMarker>),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::PostByIdNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::QueryRejection(_)
            | ServerError::MalformedJson(_)
            | ServerError::Validation(_) => StatusCode::BAD_REQUEST,
            ServerError::BodyRejection(rejection) => rejection.status(),
            ServerError::FormRejection(rejection) => rejection.status(),
            ServerError::MultipartRejection(rejection) => rejection.status(),
            ServerError::Multipart(err) => err.status(),
            ServerError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ServerError::JsonResponse(_)
            | ServerError::Database(_)
            | ServerError::Media(_)
            | ServerError::ValidationTask(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client. Server-side failures stay opaque.
    fn detail(&self) -> Option<String> {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::PostByIdNotFound(_) => Some("Not found.".to_owned()),
            ServerError::JsonResponse(_)
            | ServerError::Database(_)
            | ServerError::Media(_)
            | ServerError::ValidationTask(_) => None,
            _ => Some(self.to_string()),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
struct ErrorResponse {
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!(error = %self, %status, "Replying with error");
        } else {
            warn!(error = %self, %status, "Replying with error");
        }

        if let ServerError::Validation(errors) = self {
            return (status, Json(errors)).into_response();
        }

        let error_response = ErrorResponse {
            status: status.as_u16(),
            detail: self.detail(),
        };
        (status, Json(error_response)).into_response()
    }
}
