use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use huddle_core::Principal;
use huddle_types::api::ToggleReactionRequest;

use crate::error::ApiResult;
use crate::state::{AppState, blocking};

/// Toggle the caller's reaction. Responds with the message's updated aggregate.
pub async fn toggle_reaction(
    State(state): State<AppState>,
    Path((channel_id, message_id)): Path<(Uuid, i64)>,
    Extension(who): Extension<Principal>,
    Json(req): Json<ToggleReactionRequest>,
) -> ApiResult<impl IntoResponse> {
    let reactions = state.reactions.clone();
    let response = blocking(move || reactions.toggle(&who, channel_id, message_id, &req.emoji)).await?;
    Ok(Json(response))
}
