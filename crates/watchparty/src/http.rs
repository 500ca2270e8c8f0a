//! HTTP bootstrap: create and inspect watch parties.
//!
//! - `POST /watch-party` with `{videoUrl, title}` creates an empty room and
//!   answers `201 {roomId}`. Creating a room does not join it; the browser
//!   then opens the WebSocket and sends `join-watch-party`.
//! - `GET /watch-party/:room_id` returns the room's summary, or 404.
//! - `GET /health` answers `OK`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use watchparty_protocol::{ErrorCode, RoomCode, VideoRef};
use watchparty_room::{RoomError, RoomRegistry, RoomSummary};

/// Error body for every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

/// Errors produced by the HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The path did not contain a well-formed room code.
    #[error("no watch party with code {0:?}")]
    UnknownCode(String),

    /// The request body was missing, malformed, or semantically invalid.
    #[error("invalid request: {0}")]
    Validation(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Room(err) => match err.code() {
                ErrorCode::RoomNotFound => StatusCode::NOT_FOUND,
                ErrorCode::RoomFull | ErrorCode::AlreadyInRoom => StatusCode::CONFLICT,
                ErrorCode::RoomCreationFailed => StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::InvalidHostAction | ErrorCode::NotInRoom | ErrorCode::InvalidMessage => {
                    StatusCode::BAD_REQUEST
                }
            },
            Self::UnknownCode(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Room(err) => err.code(),
            Self::UnknownCode(_) => ErrorCode::RoomNotFound,
            Self::Validation(_) => ErrorCode::InvalidMessage,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        let body = ErrorResponse {
            code: self.error_code().as_str(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub video_url: String,
    pub title: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_id: RoomCode,
}

/// Builds the HTTP router over `registry`.
pub fn router(registry: RoomRegistry) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/watch-party", post(create_room))
        .route("/watch-party/:room_id", get(get_room))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(registry)
}

async fn health() -> &'static str {
    "OK"
}

async fn create_room(
    State(registry): State<RoomRegistry>,
    payload: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateRoomResponse>), ApiError> {
    let Json(request) = payload?;
    if request.video_url.trim().is_empty() {
        return Err(ApiError::Validation("videoUrl must not be empty".into()));
    }

    let room_id = registry
        .create_room(VideoRef::new(request.video_url, request.title))
        .await?;
    Ok((StatusCode::CREATED, Json(CreateRoomResponse { room_id })))
}

async fn get_room(
    State(registry): State<RoomRegistry>,
    Path(raw): Path<String>,
) -> Result<Json<RoomSummary>, ApiError> {
    let code = RoomCode::parse(&raw).map_err(|_| ApiError::UnknownCode(raw))?;
    Ok(Json(registry.get_room(&code).await?))
}
