//! Client side of delivery: keeps one channel's rendered sequence complete
//! across push and pull.
//!
//! ```text
//! Connecting --catch-up ok--> Streaming --push error/resync/close--> DegradedPolling
//!      ^                                                                  |
//!      +------------------------------ upgrade ---------------------------+
//! any --close--> Closed
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use huddle_types::api::HistoryResponse;
use huddle_types::models::{Message, MessageView, ReactionSummary};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("history read failed: {0}")]
    Transport(String),
    #[error("history read rejected with status {0}")]
    Rejected(u16),
    #[error("subscription is closed")]
    Closed,
}

/// Pull path: bounded reads of messages with id > cursor.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn read_since(&self, channel_id: Uuid, cursor: i64) -> Result<HistoryResponse, SyncError>;
}

/// History over the REST endpoint `GET /channels/{id}/messages?cursor=`.
pub struct HttpHistory {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpHistory {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }
}

#[async_trait]
impl HistorySource for HttpHistory {
    async fn read_since(&self, channel_id: Uuid, cursor: i64) -> Result<HistoryResponse, SyncError> {
        let response = self
            .client
            .get(format!("{}/channels/{}/messages", self.base_url, channel_id))
            .query(&[("cursor", cursor)])
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Rejected(status.as_u16()));
        }
        response
            .json::<HistoryResponse>()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Connecting,
    Streaming,
    DegradedPolling,
    Closed,
}

/// Named events received from the stream endpoint, already decoded.
#[derive(Debug, Clone)]
pub enum PushEvent {
    Messages(Vec<MessageView>),
    MessageUpdate(Message),
    /// Aggregate for one message, already rendered for this viewer.
    Reactions {
        message_id: i64,
        reactions: Vec<ReactionSummary>,
    },
    /// The server dropped the subscription; resume from our own cursor.
    Resync,
    /// Transport error, idle close, or server-side close.
    Failed(String),
}

pub struct ChannelSync<H> {
    channel_id: Uuid,
    state: SyncState,
    /// Highest id applied. Everything at or below it has been rendered.
    cursor: i64,
    rendered: BTreeMap<i64, MessageView>,
    history: H,
    poll_interval: Duration,
}

impl<H: HistorySource> ChannelSync<H> {
    pub fn new(channel_id: Uuid, cursor: i64, history: H, poll_interval: Duration) -> Self {
        Self {
            channel_id,
            state: SyncState::Connecting,
            cursor: cursor.max(0),
            rendered: BTreeMap::new(),
            history,
            poll_interval,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// Rendered sequence, ascending by id.
    pub fn messages(&self) -> impl Iterator<Item = &MessageView> {
        self.rendered.values()
    }

    /// Connecting -> Streaming. Catches up to the server before the caller
    /// starts feeding push events. On failure the sync degrades instead.
    pub async fn connect(&mut self) -> Result<(), SyncError> {
        if self.state == SyncState::Closed {
            return Err(SyncError::Closed);
        }
        self.state = SyncState::Connecting;
        match self.catch_up().await {
            Ok(()) => {
                self.state = SyncState::Streaming;
                debug!("Channel {} streaming from {}", self.channel_id, self.cursor);
                Ok(())
            }
            Err(e) => {
                warn!("Catch-up for {} failed, polling instead: {}", self.channel_id, e);
                self.state = SyncState::DegradedPolling;
                Err(e)
            }
        }
    }

    /// Apply one push event. Ignored unless streaming.
    pub async fn on_push(&mut self, event: PushEvent) -> Result<(), SyncError> {
        if self.state != SyncState::Streaming {
            return Ok(());
        }

        match event {
            PushEvent::Messages(batch) => {
                for view in batch {
                    if view.message.id <= self.cursor {
                        continue;
                    }
                    if view.message.id > self.cursor + 1 {
                        // Missed something: read the gap before applying.
                        if let Err(e) = self.catch_up().await {
                            self.degrade(&e.to_string());
                            return Err(e);
                        }
                        if view.message.id <= self.cursor {
                            continue;
                        }
                    }
                    self.apply(view);
                }
            }
            PushEvent::MessageUpdate(message) => {
                if let Some(existing) = self.rendered.get_mut(&message.id) {
                    existing.message = message;
                }
            }
            PushEvent::Reactions { message_id, reactions } => {
                if let Some(existing) = self.rendered.get_mut(&message_id) {
                    existing.reactions = reactions;
                }
            }
            PushEvent::Resync => self.degrade("server requested resync"),
            PushEvent::Failed(reason) => self.degrade(&reason),
        }
        Ok(())
    }

    /// One pull while degraded. Returns how many new messages were applied.
    pub async fn poll_once(&mut self) -> Result<usize, SyncError> {
        match self.state {
            SyncState::Closed => Err(SyncError::Closed),
            SyncState::DegradedPolling => {
                let before = self.rendered.len();
                self.catch_up().await?;
                Ok(self.rendered.len() - before)
            }
            _ => Ok(0),
        }
    }

    /// Poll on a fixed interval until cancelled or no longer degraded.
    pub async fn run_polling(&mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.tick().await;
        while self.state == SyncState::DegradedPolling {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!("Poll of {} failed: {}", self.channel_id, e);
                    }
                }
            }
        }
    }

    /// DegradedPolling -> Connecting -> Streaming, for lower latency once
    /// the push path is back.
    pub async fn upgrade(&mut self) -> Result<(), SyncError> {
        if self.state != SyncState::DegradedPolling {
            return Ok(());
        }
        info!("Channel {} re-upgrading to push", self.channel_id);
        self.connect().await
    }

    pub fn close(&mut self) {
        if self.state != SyncState::Closed {
            debug!("Channel {} sync closed at {}", self.channel_id, self.cursor);
        }
        self.state = SyncState::Closed;
    }

    fn degrade(&mut self, reason: &str) {
        if self.state == SyncState::Streaming {
            info!("Channel {} degraded to polling: {}", self.channel_id, reason);
            self.state = SyncState::DegradedPolling;
        }
    }

    async fn catch_up(&mut self) -> Result<(), SyncError> {
        loop {
            let page = self.history.read_since(self.channel_id, self.cursor).await?;
            let has_more = page.has_more && !page.messages.is_empty();
            for view in page.messages {
                if view.message.id > self.cursor {
                    self.apply(view);
                }
            }
            if !has_more {
                return Ok(());
            }
        }
    }

    fn apply(&mut self, view: MessageView) {
        self.cursor = self.cursor.max(view.message.id);
        self.rendered.insert(view.message.id, view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use huddle_types::models::MessageType;
    use std::sync::{Arc, Mutex};

    fn view(channel_id: Uuid, id: i64) -> MessageView {
        MessageView {
            message: Message {
                id,
                channel_id,
                author_id: Uuid::nil(),
                author_name: "tester".into(),
                body: format!("m{}", id),
                message_type: MessageType::Text,
                attachment: None,
                data_card: None,
                notice: None,
                pinned: false,
                parent_id: None,
                edited: false,
                deleted: false,
                created_at: Utc::now(),
            },
            reactions: Vec::new(),
        }
    }

    /// Server-side history with a page size, shared with the test body.
    #[derive(Clone)]
    struct FakeHistory {
        log: Arc<Mutex<Vec<MessageView>>>,
        page: usize,
        down: Arc<Mutex<bool>>,
    }

    impl FakeHistory {
        fn new(page: usize) -> Self {
            Self {
                log: Arc::new(Mutex::new(Vec::new())),
                page,
                down: Arc::new(Mutex::new(false)),
            }
        }

        fn append(&self, channel_id: Uuid) -> MessageView {
            let mut log = self.log.lock().unwrap();
            let v = view(channel_id, log.len() as i64 + 1);
            log.push(v.clone());
            v
        }

        fn ids(&self) -> Vec<i64> {
            self.log.lock().unwrap().iter().map(|v| v.message.id).collect()
        }
    }

    #[async_trait]
    impl HistorySource for FakeHistory {
        async fn read_since(&self, _channel_id: Uuid, cursor: i64) -> Result<HistoryResponse, SyncError> {
            if *self.down.lock().unwrap() {
                return Err(SyncError::Transport("connection refused".into()));
            }
            let log = self.log.lock().unwrap();
            let mut messages: Vec<MessageView> = log.iter().filter(|v| v.message.id > cursor).cloned().collect();
            let has_more = messages.len() > self.page;
            messages.truncate(self.page);
            let last_id = messages.last().map(|v| v.message.id).unwrap_or(cursor);
            Ok(HistoryResponse {
                messages,
                has_more,
                last_id,
            })
        }
    }

    fn rendered_ids<H: HistorySource>(sync: &ChannelSync<H>) -> Vec<i64> {
        sync.messages().map(|v| v.message.id).collect()
    }

    #[tokio::test]
    async fn push_failure_mid_stream_keeps_sequence_complete() {
        let ch = Uuid::new_v4();
        let server = FakeHistory::new(2);
        for _ in 0..3 {
            server.append(ch);
        }

        let mut sync = ChannelSync::new(ch, 0, server.clone(), Duration::from_millis(10));
        sync.connect().await.unwrap();
        assert_eq!(sync.state(), SyncState::Streaming);
        assert_eq!(rendered_ids(&sync), vec![1, 2, 3]);

        let four = server.append(ch);
        let five = server.append(ch);
        sync.on_push(PushEvent::Messages(vec![four.clone(), five])).await.unwrap();
        // Duplicate delivery is ignored.
        sync.on_push(PushEvent::Messages(vec![four])).await.unwrap();

        // 6 is never pushed; 7 arrives and the gap is read from history.
        server.append(ch);
        let seven = server.append(ch);
        sync.on_push(PushEvent::Messages(vec![seven])).await.unwrap();
        assert_eq!(sync.cursor(), 7);

        sync.on_push(PushEvent::Failed("stream reset".into())).await.unwrap();
        assert_eq!(sync.state(), SyncState::DegradedPolling);

        let mut late = Vec::new();
        for _ in 0..3 {
            late.push(server.append(ch));
        }
        // Pushes that straggle in after the failure are not applied.
        sync.on_push(PushEvent::Messages(late)).await.unwrap();
        assert_eq!(sync.cursor(), 7);

        assert_eq!(sync.poll_once().await.unwrap(), 3);
        assert_eq!(rendered_ids(&sync), server.ids());
    }

    #[tokio::test]
    async fn resync_degrades_and_upgrade_resumes_streaming() {
        let ch = Uuid::new_v4();
        let server = FakeHistory::new(50);
        let mut sync = ChannelSync::new(ch, 0, server.clone(), Duration::from_millis(10));
        sync.connect().await.unwrap();

        sync.on_push(PushEvent::Resync).await.unwrap();
        assert_eq!(sync.state(), SyncState::DegradedPolling);

        server.append(ch);
        sync.upgrade().await.unwrap();
        assert_eq!(sync.state(), SyncState::Streaming);
        assert_eq!(sync.cursor(), 1);
    }

    #[tokio::test]
    async fn connect_failure_falls_back_to_polling() {
        let ch = Uuid::new_v4();
        let server = FakeHistory::new(50);
        server.append(ch);
        *server.down.lock().unwrap() = true;

        let mut sync = ChannelSync::new(ch, 0, server.clone(), Duration::from_millis(10));
        assert!(sync.connect().await.is_err());
        assert_eq!(sync.state(), SyncState::DegradedPolling);

        *server.down.lock().unwrap() = false;
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stopper.cancel();
        });
        sync.run_polling(cancel).await;
        assert_eq!(rendered_ids(&sync), vec![1]);
    }

    #[tokio::test]
    async fn closed_sync_ignores_everything() {
        let ch = Uuid::new_v4();
        let server = FakeHistory::new(50);
        let mut sync = ChannelSync::new(ch, 0, server.clone(), Duration::from_millis(10));
        sync.close();

        server.append(ch);
        sync.on_push(PushEvent::Messages(vec![view(ch, 1)])).await.unwrap();
        assert!(matches!(sync.poll_once().await, Err(SyncError::Closed)));
        assert!(matches!(sync.connect().await, Err(SyncError::Closed)));
        assert_eq!(sync.messages().count(), 0);
    }

    #[tokio::test]
    async fn updates_replace_rendered_messages() {
        let ch = Uuid::new_v4();
        let server = FakeHistory::new(50);
        server.append(ch);
        let mut sync = ChannelSync::new(ch, 0, server.clone(), Duration::from_millis(10));
        sync.connect().await.unwrap();

        let mut edited = view(ch, 1).message;
        edited.body = "changed".into();
        edited.edited = true;
        sync.on_push(PushEvent::MessageUpdate(edited)).await.unwrap();
        assert_eq!(sync.messages().next().unwrap().message.body, "changed");
    }

    #[tokio::test]
    async fn reaction_frames_update_rendered_aggregates() {
        let ch = Uuid::new_v4();
        let server = FakeHistory::new(50);
        server.append(ch);
        let mut sync = ChannelSync::new(ch, 0, server.clone(), Duration::from_millis(10));
        sync.connect().await.unwrap();

        let thumbs = vec![ReactionSummary {
            emoji: "👍".into(),
            count: 2,
            reacted: true,
        }];
        sync.on_push(PushEvent::Reactions {
            message_id: 1,
            reactions: thumbs.clone(),
        })
        .await
        .unwrap();
        assert_eq!(sync.messages().next().unwrap().reactions, thumbs);

        // Unknown ids are ignored rather than rendered out of order.
        sync.on_push(PushEvent::Reactions {
            message_id: 9,
            reactions: thumbs,
        })
        .await
        .unwrap();
        assert_eq!(rendered_ids(&sync), vec![1]);

        sync.on_push(PushEvent::Reactions {
            message_id: 1,
            reactions: Vec::new(),
        })
        .await
        .unwrap();
        assert!(sync.messages().next().unwrap().reactions.is_empty());
    }
}
