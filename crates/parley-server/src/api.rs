//! History endpoints.
//!
//! Clients that missed a live push read the message from here on their
//! next fetch.

use crate::handlers::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use parley_core::{ChannelId, PersistentStore, StoreError, UserId};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Errors returned by the history endpoints.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Store(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::InvalidMembers(_) | StoreError::Rejected(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self, "History request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Routes under `/api`.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/messages/direct", get(direct_messages))
        .route("/api/channels/:id/messages", get(channel_messages))
        .route("/api/users/:id/channels", get(user_channels))
}

/// The two parties of a direct conversation.
#[derive(Debug, Deserialize)]
pub struct DirectParams {
    pub user1: String,
    pub user2: String,
}

async fn direct_messages(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DirectParams>,
) -> Result<Response, ApiError> {
    let messages = state
        .store
        .direct_history(&UserId::from(params.user1), &UserId::from(params.user2))
        .await?;
    Ok(Json(json!({ "messages": messages })).into_response())
}

async fn channel_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let messages = state.store.channel_history(&ChannelId::from(id)).await?;
    Ok(Json(json!({ "messages": messages })).into_response())
}

async fn user_channels(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let channels = state.store.user_channels(&UserId::from(id)).await?;
    Ok(Json(json!({ "channels": channels })).into_response())
}
