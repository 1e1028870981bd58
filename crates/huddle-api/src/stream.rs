use std::time::Duration;

use axum::{
    Extension,
    extract::{Path, Query, State},
    response::IntoResponse,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::StreamExt;
use serde::Deserialize;
use uuid::Uuid;

use huddle_core::Principal;
use huddle_gateway::connection::StreamSession;

use crate::error::ApiResult;
use crate::state::AppState;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub cursor: i64,
}

/// Live subscription. Sends everything above `cursor` first, then pushes
/// new messages as they commit. A `resync` or `closed` event ends the
/// stream; clients continue with history reads from their cursor.
pub async fn stream_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
    Query(query): Query<StreamQuery>,
    Extension(who): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    let session = StreamSession::open(
        &state.dispatcher,
        state.store.clone(),
        state.access.clone(),
        who,
        channel_id,
        query.cursor,
        state.stream_idle,
    )
    .await?;

    let events = session
        .into_stream()
        .map(|frame| Event::default().event(frame.event_name()).json_data(&frame));

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL).text("keep-alive")))
}
