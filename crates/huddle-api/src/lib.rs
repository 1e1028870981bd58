//! HTTP surface: REST handlers, the live stream endpoint, and bearer auth.

pub mod channels;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod reactions;
pub mod state;
pub mod stream;
pub mod users;

use axum::{
    Json, Router,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde_json::json;

pub use error::{ApiError, ApiResult};
pub use state::{AppState, AppStateInner, StreamSettings};

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/channels", get(channels::list_channels).post(channels::create_channel))
        .route("/channels/direct", post(channels::open_direct))
        .route(
            "/channels/{channel_id}",
            get(channels::get_channel)
                .patch(channels::update_channel)
                .delete(channels::delete_channel),
        )
        .route("/channels/{channel_id}/archive", post(channels::archive_channel))
        .route("/channels/{channel_id}/unarchive", post(channels::unarchive_channel))
        .route("/channels/{channel_id}/restriction", put(channels::set_restriction))
        .route("/channels/{channel_id}/owner", post(channels::transfer_owner))
        .route("/channels/{channel_id}/members", get(channels::list_members))
        .route(
            "/channels/{channel_id}/members/{user_id}",
            put(channels::add_member).delete(channels::remove_member),
        )
        .route(
            "/channels/{channel_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/channels/{channel_id}/messages/pinned", get(messages::get_pinned))
        .route(
            "/channels/{channel_id}/messages/{message_id}",
            axum::routing::patch(messages::edit_message).delete(messages::delete_message),
        )
        .route("/channels/{channel_id}/messages/{message_id}/thread", get(messages::get_thread))
        .route("/channels/{channel_id}/messages/{message_id}/pin", post(messages::toggle_pin))
        .route(
            "/channels/{channel_id}/messages/{message_id}/reactions",
            post(reactions::toggle_reaction),
        )
        .route("/channels/{channel_id}/stream", get(stream::stream_channel))
        .route("/users", get(users::list_users))
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state);

    Router::new().route("/health", get(health)).merge(protected)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
