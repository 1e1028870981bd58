//! One live stream: catch-up from a cursor joined to push delivery.

use std::sync::Arc;
use std::time::Duration;

use futures_util::Stream;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use huddle_core::reactions::summarize;
use huddle_core::{ChatResult, Evaluator, MessageStore, Principal};
use huddle_types::events::ChannelEvent;
use huddle_types::models::{Message, MessageView, ReactionSummary};

use crate::dispatcher::{Delivery, Dispatcher, EndReason, Subscription};

/// What a stream emits. Each variant maps to one named event on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Frame {
    Messages {
        messages: Vec<MessageView>,
        last_id: i64,
    },
    MessageUpdate {
        message: Message,
    },
    Reactions {
        message_id: i64,
        reactions: Vec<ReactionSummary>,
    },
    ChannelUpdate {
        channel_id: Uuid,
    },
    /// Push delivery stopped; resume with history reads from `cursor`.
    Resync {
        cursor: i64,
    },
    Closed {
        reason: &'static str,
    },
}

impl Frame {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Messages { .. } => "messages",
            Self::MessageUpdate { .. } => "message_update",
            Self::Reactions { .. } => "reactions",
            Self::ChannelUpdate { .. } => "channel_update",
            Self::Resync { .. } => "resync",
            Self::Closed { .. } => "closed",
        }
    }
}

pub struct StreamSession {
    store: Arc<MessageStore>,
    access: Arc<Evaluator>,
    who: Principal,
    channel_id: Uuid,
    cursor: i64,
    subscription: Subscription,
    idle_timeout: Duration,
}

impl StreamSession {
    /// Check view access, then subscribe. The subscription is registered
    /// before any history is read, so nothing appended in between is missed.
    pub async fn open(
        dispatcher: &Dispatcher,
        store: Arc<MessageStore>,
        access: Arc<Evaluator>,
        who: Principal,
        channel_id: Uuid,
        cursor: i64,
        idle_timeout: Duration,
    ) -> ChatResult<Self> {
        {
            let access = access.clone();
            let who = who.clone();
            tokio::task::spawn_blocking(move || access.require_view(&who, channel_id)).await??;
        }

        let subscription = dispatcher.subscribe(channel_id, who.user_id);
        info!("{} ({}) streaming channel {} from {}", who.username, who.user_id, channel_id, cursor);

        Ok(Self {
            store,
            access,
            who,
            channel_id,
            cursor: cursor.max(0),
            subscription,
            idle_timeout,
        })
    }

    /// Drive the session. Ends with `resync` or `closed`; ids at or below
    /// the last one delivered are never sent twice.
    pub fn into_stream(self) -> impl Stream<Item = Frame> + Send {
        let Self {
            store,
            access,
            who,
            channel_id,
            cursor,
            mut subscription,
            idle_timeout,
        } = self;

        async_stream::stream! {
            let mut last = cursor;

            match catch_up(&store, &who, channel_id, last).await {
                Ok(pages) => for (messages, last_id) in pages {
                    last = last_id;
                    yield Frame::Messages { messages, last_id };
                },
                Err(reason) => {
                    yield Frame::Closed { reason };
                    return;
                }
            }

            loop {
                let delivery = match tokio::time::timeout(idle_timeout, subscription.recv()).await {
                    Ok(delivery) => delivery,
                    Err(_) => {
                        debug!("Stream {} for {} idle, closing", channel_id, who.user_id);
                        yield Frame::Closed { reason: "idle" };
                        break;
                    }
                };

                let event = match delivery {
                    Delivery::Event(event) => event,
                    Delivery::Ended(EndReason::Lagged) => {
                        yield Frame::Resync { cursor: last };
                        break;
                    }
                    Delivery::Ended(reason) => {
                        yield Frame::Closed { reason: reason.as_str() };
                        break;
                    }
                };

                match event {
                    ChannelEvent::MessageCreate { message } => {
                        if message.id <= last {
                            continue;
                        }
                        if message.id == last + 1 {
                            last = message.id;
                            yield Frame::Messages {
                                messages: vec![MessageView { message, reactions: Vec::new() }],
                                last_id: last,
                            };
                            continue;
                        }
                        // Publishes can arrive out of id order; fill the hole from storage.
                        match catch_up(&store, &who, channel_id, last).await {
                            Ok(pages) => for (messages, last_id) in pages {
                                last = last_id;
                                yield Frame::Messages { messages, last_id };
                            },
                            Err(reason) => {
                                yield Frame::Closed { reason };
                                break;
                            }
                        }
                    }
                    // Updates for ids not yet delivered arrive with the message itself.
                    ChannelEvent::MessageUpdate { message } if message.id <= last => {
                        yield Frame::MessageUpdate { message };
                    }
                    ChannelEvent::ReactionUpdate { message_id, reactions, .. } if message_id <= last => {
                        yield Frame::Reactions {
                            message_id,
                            reactions: summarize(&reactions, who.user_id),
                        };
                    }
                    ChannelEvent::ChannelUpdate { channel_id } => {
                        if !still_visible(&access, &who, channel_id).await {
                            yield Frame::Closed { reason: EndReason::Revoked.as_str() };
                            break;
                        }
                        yield Frame::ChannelUpdate { channel_id };
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Read every page above `cursor`. Returns `(messages, last_id)` per non-empty page.
async fn catch_up(
    store: &Arc<MessageStore>,
    who: &Principal,
    channel_id: Uuid,
    cursor: i64,
) -> Result<Vec<(Vec<MessageView>, i64)>, &'static str> {
    let mut pages = Vec::new();
    let mut cursor = cursor;
    loop {
        let store = store.clone();
        let reader = who.clone();
        let page = tokio::task::spawn_blocking(move || store.list_since(&reader, channel_id, cursor, None)).await;
        let page = match page {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                warn!("Catch-up read on {} for {} failed: {}", channel_id, who.user_id, e);
                return Err("unavailable");
            }
            Err(e) => {
                warn!("spawn_blocking join error: {}", e);
                return Err("unavailable");
            }
        };

        if !page.messages.is_empty() {
            cursor = page.last_id;
            pages.push((page.messages, page.last_id));
        }
        if !page.has_more {
            return Ok(pages);
        }
    }
}

async fn still_visible(access: &Arc<Evaluator>, who: &Principal, channel_id: Uuid) -> bool {
    let access = access.clone();
    let who = who.clone();
    matches!(
        tokio::task::spawn_blocking(move || access.require_view(&who, channel_id)).await,
        Ok(Ok(_))
    )
}
