//! Database row types. These map directly to SQLite rows and convert into the
//! shared `huddle-types` models at the crate boundary.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use huddle_types::models::{Attachment, Channel, DataCard, Message, MessageType, User};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub roles: String,
    pub last_seen_at: String,
}

impl UserRow {
    pub fn into_user(self) -> Result<User> {
        Ok(User {
            id: self.id.parse().with_context(|| format!("corrupt user id '{}'", self.id))?,
            username: self.username,
            display_name: self.display_name,
            roles: decode_roles(&self.roles),
        })
    }
}

pub struct ChannelRow {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub kind: String,
    pub category: String,
    pub description: Option<String>,
    pub created_by: String,
    pub archived: bool,
    pub restricted: bool,
    pub allowed_roles: Vec<String>,
    pub last_message_id: i64,
    pub created_at: String,
}

impl ChannelRow {
    pub fn into_channel(self) -> Result<Channel> {
        Ok(Channel {
            id: self.id.parse().with_context(|| format!("corrupt channel id '{}'", self.id))?,
            kind: self.kind.parse().map_err(anyhow::Error::msg)?,
            created_by: self
                .created_by
                .parse()
                .with_context(|| format!("corrupt creator on channel '{}'", self.id))?,
            created_at: parse_timestamp(&self.created_at),
            name: self.name,
            display_name: self.display_name,
            category: self.category,
            description: self.description,
            archived: self.archived,
            restricted: self.restricted,
            allowed_roles: self.allowed_roles,
            last_message_id: self.last_message_id,
        })
    }
}

pub struct MessageRow {
    pub channel_id: String,
    pub id: i64,
    pub author_id: String,
    pub author_name: String,
    pub body: String,
    pub message_type: String,
    pub attachment_url: Option<String>,
    pub attachment_filename: Option<String>,
    pub attachment_size: Option<i64>,
    pub attachment_is_image: bool,
    pub data_card: Option<String>,
    pub notice: Option<String>,
    pub pinned: bool,
    pub parent_id: Option<i64>,
    pub edited: bool,
    pub deleted: bool,
    pub created_at: String,
}

impl MessageRow {
    pub fn into_message(self) -> Result<Message> {
        let attachment = match (self.attachment_url, self.attachment_filename) {
            (Some(url), Some(filename)) => Some(Attachment {
                url,
                filename,
                size: self.attachment_size.unwrap_or(0).max(0) as u64,
                is_image: self.attachment_is_image,
            }),
            _ => None,
        };

        // A card that no longer parses is dropped rather than failing the whole read.
        let data_card = self.data_card.as_deref().and_then(|raw| {
            serde_json::from_str::<DataCard>(raw)
                .map_err(|e| {
                    warn!("Corrupt data_card on message {}/{}: {}", self.channel_id, self.id, e)
                })
                .ok()
        });

        Ok(Message {
            id: self.id,
            channel_id: self
                .channel_id
                .parse()
                .with_context(|| format!("corrupt channel_id '{}'", self.channel_id))?,
            author_id: self.author_id.parse().unwrap_or_else(|e| {
                warn!("Corrupt author_id '{}' on message {}: {}", self.author_id, self.id, e);
                Uuid::nil()
            }),
            author_name: self.author_name,
            body: self.body,
            message_type: self.message_type.parse().unwrap_or(MessageType::Text),
            attachment,
            data_card,
            notice: self.notice,
            pinned: self.pinned,
            parent_id: self.parent_id,
            edited: self.edited,
            deleted: self.deleted,
            created_at: parse_timestamp(&self.created_at),
        })
    }
}

pub struct ReactionRow {
    pub channel_id: String,
    pub message_id: i64,
    pub user_id: String,
    pub emoji: String,
    pub created_at: String,
}

/// Insert payload for a new channel.
pub struct NewChannel<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub display_name: &'a str,
    pub kind: &'a str,
    pub category: &'a str,
    pub description: Option<&'a str>,
    pub created_by: &'a str,
    pub restricted: bool,
    pub allowed_roles: &'a [String],
    pub members: &'a [String],
    pub direct_key: Option<&'a str>,
}

/// Insert payload for a new message. The id is assigned by the database.
pub struct NewMessage<'a> {
    pub channel_id: &'a str,
    pub author_id: &'a str,
    pub body: &'a str,
    pub message_type: &'a str,
    pub attachment: Option<&'a Attachment>,
    pub data_card: Option<String>,
    pub notice: Option<&'a str>,
    pub parent_id: Option<i64>,
}

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339()
}

/// Accepts RFC 3339 as written by this crate, and SQLite's own
/// `YYYY-MM-DD HH:MM:SS` form for rows written by hand.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

pub fn encode_roles(roles: &[String]) -> String {
    serde_json::to_string(roles).unwrap_or_else(|_| "[]".to_string())
}

pub fn decode_roles(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

pub struct MemberRow {
    pub user_id: String,
    pub username: String,
    pub display_name: String,
}
