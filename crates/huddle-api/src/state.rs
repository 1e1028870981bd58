use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use huddle_core::lookup::LookupRegistry;
use huddle_core::{
    AccessPolicy, ChannelDirectory, ChatConfig, ChatResult, EventSink, Evaluator, MessageStore, ReactionAggregator,
};
use huddle_db::Database;
use huddle_gateway::dispatcher::Dispatcher;

use crate::error::{ApiError, ApiResult};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub access: Arc<Evaluator>,
    pub directory: Arc<ChannelDirectory>,
    pub store: Arc<MessageStore>,
    pub reactions: Arc<ReactionAggregator>,
    pub dispatcher: Dispatcher,
    pub stream_idle: Duration,
}

/// Delivery settings for live streams.
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    /// Events buffered per subscriber before it is dropped to resync.
    pub buffer: usize,
    pub idle_timeout: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            buffer: 64,
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl AppStateInner {
    /// Wire every service onto one database and one dispatcher.
    pub fn new(
        db: Database,
        jwt_secret: String,
        config: ChatConfig,
        lookups: LookupRegistry,
        stream: StreamSettings,
    ) -> AppState {
        let db = Arc::new(db);
        let access = Arc::new(Evaluator::new(
            db.clone(),
            AccessPolicy::new(&config.admin_roles, &config.creator_roles),
        ));
        let dispatcher = Dispatcher::new(stream.buffer);
        let sink: Arc<dyn EventSink> = Arc::new(dispatcher.clone());

        Arc::new(Self {
            directory: Arc::new(ChannelDirectory::new(db.clone(), access.clone(), sink.clone())),
            store: Arc::new(MessageStore::new(
                db.clone(),
                access.clone(),
                sink.clone(),
                lookups,
                config,
            )),
            reactions: Arc::new(ReactionAggregator::new(db.clone(), access.clone(), sink)),
            db,
            jwt_secret,
            access,
            dispatcher,
            stream_idle: stream.idle_timeout,
        })
    }
}

/// Run a synchronous core call off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> ChatResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal()
        })?
        .map_err(ApiError::from)
}
