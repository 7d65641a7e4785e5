use crate::media::{MediaError, MediaStore};
use axum::{
    Router,
    extract::{
        DefaultBodyLimit, FromRef, Request,
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use devsphere_common::model::{Id, ValidationError, post::PostMarker};
use devsphere_db::client::{DbClient, DbError};
use extract::Json;
use serde::Serialize;
use std::{borrow::Cow, sync::Arc};
use thiserror::Error;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::error;

mod client_ip;
mod extract;
mod routes;
#[cfg(test)]
mod testing;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, Debug, FromRef)]
pub struct ServerState {
    pub db_client: Arc<DbClient>,
    pub media_store: Arc<MediaStore>,
}

/// The complete application: API routes, stored media and the HTTP layers.
pub fn app(state: ServerState, max_upload_bytes: usize) -> Router {
    let media = ServeDir::new(state.media_store.root());

    routes::routes()
        .nest_service("/media", media)
        .fallback(fallback)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

/// Wraps a response body so it serializes with `"success": true` next to its fields.
#[derive(Clone, Debug, Serialize)]
pub struct Success<T> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

impl<T> Success<T> {
    pub fn json(body: T) -> Json<Self> {
        Json(Self {
            success: true,
            body,
        })
    }
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query string rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("Multipart body rejected: {0}")]
    MultipartRejection(#[from] MultipartRejection),
    #[error("Reading multipart body failed: {0}")]
    Multipart(#[from] MultipartError),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Could not determine IP address")]
    UnknownClientIp,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error(transparent)]
    Upload(#[from] MediaError),
    #[error("Post with id {0} was not found.")]
    PostByIdNotFound(Id<PostMarker>),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::PostByIdNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Multipart(err) => err.status(),
            ServerError::QueryRejection(_)
            | ServerError::JsonRejection(_)
            | ServerError::MultipartRejection(_)
            | ServerError::UnknownClientIp
            | ServerError::Validation(_) => StatusCode::BAD_REQUEST,
            ServerError::JsonResponse(_) | ServerError::Database(_) | ServerError::Upload(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// What the client is told. Server-side failures stay vague.
    pub fn message(&self) -> Cow<'static, str> {
        match self {
            ServerError::UnknownRoute(_) => "Endpoint not found".into(),
            ServerError::PathRejection(_) | ServerError::PostByIdNotFound(_) => {
                "Post not found".into()
            }
            ServerError::Database(DbError::UsernameGenerationExhausted(_)) => {
                "Could not generate unique username".into()
            }
            ServerError::Upload(_) => "Error uploading media".into(),
            ServerError::Multipart(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                "Request body is too large".into()
            }
            ServerError::JsonResponse(_) | ServerError::Database(_) => {
                "Internal server error".into()
            }
            ServerError::QueryRejection(_)
            | ServerError::JsonRejection(_)
            | ServerError::MultipartRejection(_)
            | ServerError::Multipart(_)
            | ServerError::UnknownClientIp
            | ServerError::Validation(_) => self.to_string().into(),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct ErrorResponse {
    success: bool,
    message: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        error!(error = %self, %status, "Replying with error");

        let error_response = ErrorResponse {
            success: false,
            message: self.message(),
            error: cfg!(debug_assertions).then(|| self.to_string()),
            path: match &self {
                ServerError::UnknownRoute(uri) => Some(uri.path().to_owned()),
                _ => None,
            },
        };
        (status, Json(error_response)).into_response()
    }
}
