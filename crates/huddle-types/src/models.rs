use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Public,
    Private,
    Direct,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Direct => "direct",
        }
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            "direct" => Ok(Self::Direct),
            other => Err(format!("unknown channel kind: {}", other)),
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub kind: ChannelKind,
    pub category: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub archived: bool,
    pub restricted: bool,
    /// Only meaningful when `restricted` is set on a public channel.
    pub allowed_roles: Vec<String>,
    pub last_message_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    /// Carries a command whose lookup is still in flight.
    Command,
    System,
    Card,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Command => "command",
            Self::System => "system",
            Self::Card => "card",
        }
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "command" => Ok(Self::Command),
            "system" => Ok(Self::System),
            "card" => Ok(Self::Card),
            other => Err(format!("unknown message type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub filename: String,
    pub size: u64,
    pub is_image: bool,
}

/// The domains an inline command can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
    Order,
    Lead,
    Appointment,
    Product,
    Ticket,
    Search,
}

impl LookupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Lead => "lead",
            Self::Appointment => "appointment",
            Self::Product => "product",
            Self::Ticket => "ticket",
            Self::Search => "search",
        }
    }
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display-safe projection of an external record, captured when the message
/// was sent. Never a live reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataCard {
    Order {
        id: String,
        number: String,
        status: String,
        total: String,
        currency: String,
        customer_name: Option<String>,
        placed_at: Option<DateTime<Utc>>,
    },
    Lead {
        id: String,
        name: String,
        company: Option<String>,
        status: String,
        owner_name: Option<String>,
        estimated_value: Option<String>,
    },
    Appointment {
        id: String,
        title: String,
        starts_at: DateTime<Utc>,
        ends_at: Option<DateTime<Utc>>,
        status: String,
        attendee_name: Option<String>,
    },
    Product {
        id: String,
        name: String,
        sku: Option<String>,
        price: String,
        currency: String,
        in_stock: Option<i64>,
    },
    Ticket {
        id: String,
        subject: String,
        status: String,
        priority: Option<String>,
        assignee_name: Option<String>,
    },
    SearchResults {
        query: String,
        results: Vec<SearchHit>,
    },
}

impl DataCard {
    pub fn kind(&self) -> LookupKind {
        match self {
            Self::Order { .. } => LookupKind::Order,
            Self::Lead { .. } => LookupKind::Lead,
            Self::Appointment { .. } => LookupKind::Appointment,
            Self::Product { .. } => LookupKind::Product,
            Self::Ticket { .. } => LookupKind::Ticket,
            Self::SearchResults { .. } => LookupKind::Search,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub kind: LookupKind,
    pub id: String,
    pub title: String,
    pub subtitle: Option<String>,
}

/// A persisted message, without viewer-specific data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub channel_id: Uuid,
    pub author_id: Uuid,
    pub author_name: String,
    pub body: String,
    pub message_type: MessageType,
    pub attachment: Option<Attachment>,
    pub data_card: Option<DataCard>,
    /// Visible annotation, e.g. a command that could not be resolved.
    pub notice: Option<String>,
    pub pinned: bool,
    pub parent_id: Option<i64>,
    pub edited: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionSummary {
    pub emoji: String,
    pub count: usize,
    pub reacted: bool,
}

/// Viewer-independent reaction state for one emoji, carried in push events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionTally {
    pub emoji: String,
    pub user_ids: Vec<Uuid>,
}

impl ReactionTally {
    pub fn summary_for(&self, viewer: Uuid) -> ReactionSummary {
        ReactionSummary {
            emoji: self.emoji.clone(),
            count: self.user_ids.len(),
            reacted: self.user_ids.contains(&viewer),
        }
    }
}

/// What a client renders: the message plus the viewer's reaction aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub reactions: Vec<ReactionSummary>,
}
