//! Shared wiring for unit tests: an in-memory database and every service on top.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use huddle_db::Database;
use huddle_types::api::CreateChannelRequest;
use huddle_types::events::ChannelEvent;
use huddle_types::models::{ChannelKind, DataCard, LookupKind};

use crate::access::{AccessPolicy, Evaluator, Principal};
use crate::lookup::{LookupRegistry, StaticLookup};
use crate::{ChannelDirectory, ChatConfig, EventSink, MessageStore, ReactionAggregator};

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ChannelEvent>>,
}

impl EventSink for RecordingSink {
    fn publish(&self, event: ChannelEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn order_card() -> DataCard {
    DataCard::Order {
        id: "o-1001".into(),
        number: "1001".into(),
        status: "paid".into(),
        total: "42.00".into(),
        currency: "USD".into(),
        customer_name: Some("Ada".into()),
        placed_at: None,
    }
}

pub struct Fixture {
    pub db: Arc<Database>,
    pub sink: Arc<RecordingSink>,
    pub directory: ChannelDirectory,
    pub store: Arc<MessageStore>,
    pub reactions: ReactionAggregator,
}

impl Fixture {
    /// Orders `1001` resolve instantly; everything else is absent.
    pub fn new() -> Self {
        let mut registry = LookupRegistry::new();
        registry.register(
            LookupKind::Order,
            Arc::new(StaticLookup::new().with_record("1001", order_card())),
        );
        let config = ChatConfig::default();
        Self::build(registry, config)
    }

    pub fn with_lookups(registry: LookupRegistry, inline: Duration, deadline: Duration) -> Self {
        let config = ChatConfig {
            lookup_inline: inline,
            lookup_deadline: deadline,
            ..ChatConfig::default()
        };
        Self::build(registry, config)
    }

    fn build(registry: LookupRegistry, config: ChatConfig) -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let sink = Arc::new(RecordingSink::default());
        let access = Arc::new(Evaluator::new(
            db.clone(),
            AccessPolicy::new(&config.admin_roles, &config.creator_roles),
        ));
        let events: Arc<dyn EventSink> = sink.clone();

        Self {
            directory: ChannelDirectory::new(db.clone(), access.clone(), events.clone()),
            store: Arc::new(MessageStore::new(
                db.clone(),
                access.clone(),
                events.clone(),
                registry,
                config,
            )),
            reactions: ReactionAggregator::new(db.clone(), access, events),
            db,
            sink,
        }
    }

    pub fn user(&self, name: &str, roles: &[&str]) -> Principal {
        let roles: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
        let id = Uuid::new_v4();
        self.db.upsert_user(&id.to_string(), name, name, &roles).unwrap();
        Principal::new(id, name, &roles)
    }

    pub fn public(&self, name: &str) -> CreateChannelRequest {
        CreateChannelRequest {
            name: name.into(),
            display_name: None,
            kind: ChannelKind::Public,
            category: None,
            description: None,
            restricted: false,
            allowed_roles: vec![],
            members: vec![],
        }
    }

    pub fn private(&self, name: &str, members: &[Uuid]) -> CreateChannelRequest {
        CreateChannelRequest {
            kind: ChannelKind::Private,
            members: members.to_vec(),
            ..self.public(name)
        }
    }

    pub fn events(&self) -> Vec<ChannelEvent> {
        self.sink.events.lock().unwrap().clone()
    }
}
