use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use huddle_core::Principal;
use huddle_types::api::{EditMessageRequest, HistoryQuery, SendMessageRequest};

use crate::error::ApiResult;
use crate::state::{AppState, blocking};

/// History read: messages with id > `cursor`, ascending. This is also the
/// pull fallback when the live stream is unavailable.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
    Extension(who): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    let store = state.store.clone();
    let page = blocking(move || store.list_since(&who, channel_id, query.cursor, query.limit)).await?;
    Ok(Json(page))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(who): Extension<Principal>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let view = state.store.clone().send(who, channel_id, req).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_pinned(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(who): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    let store = state.store.clone();
    let pinned = blocking(move || store.list_pinned(&who, channel_id)).await?;
    Ok(Json(pinned))
}

pub async fn get_thread(
    State(state): State<AppState>,
    Path((channel_id, message_id)): Path<(Uuid, i64)>,
    Extension(who): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    let store = state.store.clone();
    let replies = blocking(move || store.list_thread(&who, channel_id, message_id)).await?;
    Ok(Json(replies))
}

pub async fn edit_message(
    State(state): State<AppState>,
    Path((channel_id, message_id)): Path<(Uuid, i64)>,
    Extension(who): Extension<Principal>,
    Json(req): Json<EditMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let store = state.store.clone();
    let view = blocking(move || store.edit(&who, channel_id, message_id, &req.body)).await?;
    Ok(Json(view))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path((channel_id, message_id)): Path<(Uuid, i64)>,
    Extension(who): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    let store = state.store.clone();
    blocking(move || store.delete(&who, channel_id, message_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_pin(
    State(state): State<AppState>,
    Path((channel_id, message_id)): Path<(Uuid, i64)>,
    Extension(who): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    let store = state.store.clone();
    let pinned = blocking(move || store.toggle_pin(&who, channel_id, message_id)).await?;
    Ok(Json(pinned))
}
