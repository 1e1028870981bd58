use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use huddle_core::Principal;
use huddle_types::api::{
    ChangeResponse, CreateChannelRequest, OpenDirectRequest, RestrictionRequest, TransferOwnerRequest,
    UpdateChannelRequest,
};

use crate::error::ApiResult;
use crate::state::{AppState, blocking};

pub async fn list_channels(
    State(state): State<AppState>,
    Extension(who): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    let directory = state.directory.clone();
    let list = blocking(move || directory.list(&who)).await?;
    Ok(Json(list))
}

pub async fn create_channel(
    State(state): State<AppState>,
    Extension(who): Extension<Principal>,
    Json(req): Json<CreateChannelRequest>,
) -> ApiResult<impl IntoResponse> {
    let directory = state.directory.clone();
    let channel = blocking(move || directory.create(&who, req)).await?;
    Ok((StatusCode::CREATED, Json(channel)))
}

pub async fn open_direct(
    State(state): State<AppState>,
    Extension(who): Extension<Principal>,
    Json(req): Json<OpenDirectRequest>,
) -> ApiResult<impl IntoResponse> {
    let directory = state.directory.clone();
    let channel = blocking(move || directory.open_direct(&who, req.user_id)).await?;
    Ok(Json(channel))
}

pub async fn get_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(who): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    let directory = state.directory.clone();
    let summary = blocking(move || directory.get(&who, channel_id)).await?;
    Ok(Json(summary))
}

pub async fn update_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(who): Extension<Principal>,
    Json(req): Json<UpdateChannelRequest>,
) -> ApiResult<impl IntoResponse> {
    let directory = state.directory.clone();
    let channel = blocking(move || directory.update(&who, channel_id, req)).await?;
    Ok(Json(channel))
}

pub async fn delete_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(who): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    let directory = state.directory.clone();
    blocking(move || directory.delete(&who, channel_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn archive_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(who): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    set_archived(state, who, channel_id, true).await
}

pub async fn unarchive_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(who): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    set_archived(state, who, channel_id, false).await
}

async fn set_archived(
    state: AppState,
    who: Principal,
    channel_id: Uuid,
    archived: bool,
) -> ApiResult<Json<ChangeResponse>> {
    let directory = state.directory.clone();
    let changed = blocking(move || directory.set_archived(&who, channel_id, archived)).await?;
    Ok(Json(ChangeResponse { changed }))
}

pub async fn set_restriction(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(who): Extension<Principal>,
    Json(req): Json<RestrictionRequest>,
) -> ApiResult<impl IntoResponse> {
    let directory = state.directory.clone();
    let channel = blocking(move || directory.set_restriction(&who, channel_id, req)).await?;
    Ok(Json(channel))
}

pub async fn transfer_owner(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(who): Extension<Principal>,
    Json(req): Json<TransferOwnerRequest>,
) -> ApiResult<impl IntoResponse> {
    let directory = state.directory.clone();
    let channel = blocking(move || directory.transfer_ownership(&who, channel_id, req.user_id)).await?;
    Ok(Json(channel))
}

pub async fn list_members(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Extension(who): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    let directory = state.directory.clone();
    let members = blocking(move || directory.members(&who, channel_id)).await?;
    Ok(Json(members))
}

pub async fn add_member(
    State(state): State<AppState>,
    Path((channel_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(who): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    let directory = state.directory.clone();
    let changed = blocking(move || directory.add_member(&who, channel_id, user_id)).await?;
    Ok(Json(ChangeResponse { changed }))
}

/// Remove a member, or leave when `user_id` is the caller.
pub async fn remove_member(
    State(state): State<AppState>,
    Path((channel_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(who): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    let directory = state.directory.clone();
    let changed = blocking(move || directory.remove_member(&who, channel_id, user_id)).await?;
    Ok(Json(ChangeResponse { changed }))
}
