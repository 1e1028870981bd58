use axum::{Extension, Json, extract::State, response::IntoResponse};

use huddle_core::Principal;
use huddle_types::api::UserResponse;

use crate::error::ApiResult;
use crate::state::{AppState, blocking};

/// Users seen by this server, for DM targets and member pickers.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(_who): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    let directory = state.directory.clone();
    let users = blocking(move || directory.known_users()).await?;
    let users: Vec<UserResponse> = users
        .into_iter()
        .map(|u| UserResponse {
            id: u.id,
            username: u.username,
            display_name: u.display_name,
        })
        .collect();
    Ok(Json(users))
}
