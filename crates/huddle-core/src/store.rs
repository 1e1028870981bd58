//! Message Store: append with per-channel ids, cursor reads, edit, pin, delete.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use huddle_db::Database;
use huddle_db::models::{MessageRow, NewMessage};
use huddle_types::api::{AttachmentInput, HistoryResponse, PinResponse, SendMessageRequest};
use huddle_types::events::ChannelEvent;
use huddle_types::models::{Attachment, DataCard, MessageType, MessageView};

use crate::EventSink;
use crate::access::{Evaluator, Principal};
use crate::commands::{CommandResolver, ParsedCommand, Resolution, parse_command, timeout_notice};
use crate::config::ChatConfig;
use crate::error::{ChatError, ChatResult};
use crate::lookup::LookupRegistry;
use crate::reactions::{summarize, tally};
use crate::sanitize::{escape_markup, sanitize_body, sanitize_filename, strip_controls};

const MAX_FILENAME_LEN: usize = 255;
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "avif", "svg"];

/// A send that passed validation and is ready to persist.
struct Prepared {
    body: String,
    attachment: Option<Attachment>,
    parent_id: Option<i64>,
    command: Option<ParsedCommand>,
}

/// What the inline lookup window produced.
enum Outcome {
    Plain,
    Resolved(Resolution),
    Pending(ParsedCommand, JoinHandle<Resolution>),
}

pub struct MessageStore {
    db: Arc<Database>,
    access: Arc<Evaluator>,
    sink: Arc<dyn EventSink>,
    resolver: CommandResolver,
    config: ChatConfig,
}

impl MessageStore {
    pub fn new(
        db: Arc<Database>,
        access: Arc<Evaluator>,
        sink: Arc<dyn EventSink>,
        lookups: LookupRegistry,
        config: ChatConfig,
    ) -> Self {
        Self {
            db,
            access,
            sink,
            resolver: CommandResolver::new(lookups),
            config,
        }
    }

    /// Append a message. The caller never supplies an id.
    ///
    /// A recognised command is resolved inline for up to `lookup_inline`.
    /// Past that the message is stored as a pending command and a background
    /// task upgrades it (or degrades it to text) and publishes the update.
    pub async fn send(
        self: Arc<Self>,
        who: Principal,
        channel_id: Uuid,
        req: SendMessageRequest,
    ) -> ChatResult<MessageView> {
        let prepared = {
            let this = self.clone();
            let who = who.clone();
            tokio::task::spawn_blocking(move || this.prepare(&who, channel_id, req)).await??
        };

        let outcome = match prepared.command.clone() {
            None => Outcome::Plain,
            Some(command) => self.resolve_inline(command).await,
        };

        let (message_type, data_card, notice) = match &outcome {
            Outcome::Plain => (MessageType::Text, None, None),
            Outcome::Resolved(Resolution::Card(card)) => (MessageType::Card, Some(encode_card(card)?), None),
            Outcome::Resolved(Resolution::Failed(notice)) => (MessageType::Text, None, Some(escape_markup(notice))),
            Outcome::Pending(..) => (MessageType::Command, None, None),
        };

        let row = {
            let this = self.clone();
            let poster = who.clone();
            tokio::task::spawn_blocking(move || {
                // Rights may have changed while the lookup was in flight.
                this.access.require_post(&poster, channel_id)?;
                let author = poster.user_id.to_string();
                this.db
                    .insert_message(&NewMessage {
                        channel_id: &channel_id.to_string(),
                        author_id: &author,
                        body: &prepared.body,
                        message_type: message_type.as_str(),
                        attachment: prepared.attachment.as_ref(),
                        data_card,
                        notice: notice.as_deref(),
                        parent_id: prepared.parent_id,
                    })?
                    .ok_or(ChatError::Forbidden)
            })
            .await??
        };

        let message = row.into_message()?;
        info!(
            "{} ({}) posted {}/{} [{}]",
            who.username,
            who.user_id,
            channel_id,
            message.id,
            message.message_type.as_str()
        );
        self.sink.publish(ChannelEvent::MessageCreate {
            message: message.clone(),
        });

        if let Outcome::Pending(command, task) = outcome {
            let this = self.clone();
            let message_id = message.id;
            tokio::spawn(async move {
                this.finish_command(channel_id, message_id, command, task).await;
            });
        }

        Ok(MessageView {
            message,
            reactions: Vec::new(),
        })
    }

    async fn resolve_inline(&self, command: ParsedCommand) -> Outcome {
        let resolver = self.resolver.clone();
        let lookup = command.clone();
        let mut task = tokio::spawn(async move { resolver.resolve(&lookup).await });

        match tokio::time::timeout(self.config.lookup_inline, &mut task).await {
            Ok(Ok(resolution)) => Outcome::Resolved(resolution),
            Ok(Err(e)) => {
                error!("Lookup task for /{} failed: {}", command.name, e);
                Outcome::Resolved(Resolution::Failed(timeout_notice(&command)))
            }
            Err(_) => {
                debug!("/{} still resolving after inline budget, deferring", command.name);
                Outcome::Pending(command, task)
            }
        }
    }

    async fn finish_command(
        self: Arc<Self>,
        channel_id: Uuid,
        message_id: i64,
        command: ParsedCommand,
        mut task: JoinHandle<Resolution>,
    ) {
        let remaining = self.config.lookup_deadline.saturating_sub(self.config.lookup_inline);
        let resolution = match tokio::time::timeout(remaining, &mut task).await {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(e)) => {
                error!("Deferred lookup for {}/{} failed: {}", channel_id, message_id, e);
                Resolution::Failed(timeout_notice(&command))
            }
            Err(_) => {
                task.abort();
                warn!("Lookup for {}/{} passed its deadline", channel_id, message_id);
                Resolution::Failed(timeout_notice(&command))
            }
        };

        let (message_type, data_card, notice) = match resolution {
            Resolution::Card(card) => match serde_json::to_string(&card) {
                Ok(json) => (MessageType::Card, Some(json), None),
                Err(e) => {
                    error!("Failed to encode card for {}/{}: {}", channel_id, message_id, e);
                    (MessageType::Text, None, Some(escape_markup(&timeout_notice(&command))))
                }
            },
            Resolution::Failed(notice) => (MessageType::Text, None, Some(escape_markup(&notice))),
        };

        let db = self.db.clone();
        let completed = tokio::task::spawn_blocking(move || {
            db.complete_command(
                &channel_id.to_string(),
                message_id,
                message_type.as_str(),
                data_card,
                notice.as_deref(),
            )
        })
        .await;

        match completed {
            Ok(Ok(Some(row))) => match row.into_message() {
                Ok(message) => {
                    debug!("Completed command {}/{} as {}", channel_id, message_id, message.message_type.as_str());
                    self.sink.publish(ChannelEvent::MessageUpdate { message });
                }
                Err(e) => error!("Failed to load completed command {}/{}: {}", channel_id, message_id, e),
            },
            // Edited, deleted, or the channel is gone; nothing left to upgrade.
            Ok(Ok(None)) => debug!("Command {}/{} no longer pending", channel_id, message_id),
            Ok(Err(e)) => error!("Failed to store command result {}/{}: {}", channel_id, message_id, e),
            Err(e) => error!("spawn_blocking join error: {}", e),
        }
    }

    fn prepare(&self, who: &Principal, channel_id: Uuid, req: SendMessageRequest) -> ChatResult<Prepared> {
        self.access.require_post(who, channel_id)?;

        let attachment = req
            .attachment
            .map(|input| self.validate_attachment(input))
            .transpose()?;
        let body = self.validate_body(&req.body, attachment.is_some())?;
        // Lookups see the argument as typed, not its escaped form.
        let command = parse_command(&strip_controls(&req.body));

        if let Some(parent_id) = req.parent_id {
            let exists = self.db.get_message(&channel_id.to_string(), parent_id)?.is_some();
            if !exists {
                return Err(ChatError::NotFound("message"));
            }
        }

        Ok(Prepared {
            body,
            attachment,
            parent_id: req.parent_id,
            command,
        })
    }

    fn validate_body(&self, raw: &str, has_attachment: bool) -> ChatResult<String> {
        let body = sanitize_body(raw);
        if body.chars().count() > self.config.max_body_chars {
            return Err(ChatError::validation(format!(
                "message body exceeds {} characters",
                self.config.max_body_chars
            )));
        }
        if body.is_empty() && !has_attachment {
            return Err(ChatError::validation("message body is empty"));
        }
        Ok(body)
    }

    fn validate_attachment(&self, input: AttachmentInput) -> ChatResult<Attachment> {
        if input.size > self.config.max_attachment_bytes {
            return Err(ChatError::AttachmentTooLarge {
                limit: self.config.max_attachment_bytes,
            });
        }
        let url = input.url.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ChatError::validation("attachment url must be http(s)"));
        }
        let filename = sanitize_filename(&input.filename);
        if filename.is_empty() || filename.chars().count() > MAX_FILENAME_LEN {
            return Err(ChatError::validation("attachment filename must be 1-255 characters"));
        }
        let is_image = is_image_filename(&filename);
        Ok(Attachment {
            url: url.to_string(),
            filename,
            size: input.size,
            is_image,
        })
    }

    /// Messages with id > `cursor`, ascending, at most `limit` (capped by
    /// config). `last_id` is where the next read should start.
    pub fn list_since(
        &self,
        who: &Principal,
        channel_id: Uuid,
        cursor: i64,
        limit: Option<usize>,
    ) -> ChatResult<HistoryResponse> {
        self.access.require_view(who, channel_id)?;

        let cursor = cursor.max(0);
        let cap = self.config.history_limit;
        let limit = limit.unwrap_or(cap).clamp(1, cap);

        let cid = channel_id.to_string();
        let mut rows = self.db.messages_since(&cid, cursor, limit + 1)?;
        let has_more = rows.len() > limit;
        rows.truncate(limit);

        let messages = self.with_reactions(&cid, rows, who.user_id)?;
        let last_id = messages.last().map(|m| m.message.id).unwrap_or(cursor);
        Ok(HistoryResponse {
            messages,
            has_more,
            last_id,
        })
    }

    pub fn list_pinned(&self, who: &Principal, channel_id: Uuid) -> ChatResult<Vec<MessageView>> {
        self.access.require_view(who, channel_id)?;
        let cid = channel_id.to_string();
        let rows = self.db.pinned_messages(&cid)?;
        self.with_reactions(&cid, rows, who.user_id)
    }

    pub fn list_thread(&self, who: &Principal, channel_id: Uuid, parent_id: i64) -> ChatResult<Vec<MessageView>> {
        self.access.require_view(who, channel_id)?;
        let cid = channel_id.to_string();
        if self.db.get_message(&cid, parent_id)?.is_none() {
            return Err(ChatError::NotFound("message"));
        }
        let rows = self.db.thread_messages(&cid, parent_id)?;
        self.with_reactions(&cid, rows, who.user_id)
    }

    /// Replace the body. Author or channel manager only; commands in the new
    /// body are not re-resolved.
    pub fn edit(&self, who: &Principal, channel_id: Uuid, message_id: i64, body: &str) -> ChatResult<MessageView> {
        let auth = self.access.require_post(who, channel_id)?;
        let cid = channel_id.to_string();
        let existing = self.live_message(&cid, message_id)?;
        if existing.author_id != who.user_id.to_string() && !auth.access.manage {
            return Err(ChatError::Forbidden);
        }

        let body = self.validate_body(body, existing.attachment_url.is_some())?;
        let row = self
            .db
            .update_message_body(&cid, message_id, &body)?
            .ok_or(ChatError::NotFound("message"))?;

        info!("{} ({}) edited {}/{}", who.username, who.user_id, channel_id, message_id);
        self.publish_update(row, who.user_id)
    }

    pub fn toggle_pin(&self, who: &Principal, channel_id: Uuid, message_id: i64) -> ChatResult<PinResponse> {
        self.access.require_post(who, channel_id)?;
        let cid = channel_id.to_string();
        let existing = self.live_message(&cid, message_id)?;

        let row = self
            .db
            .set_pinned(&cid, message_id, !existing.pinned, &who.user_id.to_string())?
            .ok_or(ChatError::NotFound("message"))?;
        let pinned = row.pinned;

        info!(
            "{} ({}) {} {}/{}",
            who.username,
            who.user_id,
            if pinned { "pinned" } else { "unpinned" },
            channel_id,
            message_id
        );
        self.publish_update(row, who.user_id)?;
        Ok(PinResponse { pinned })
    }

    /// Tombstone a message. Its id stays in the sequence; deleting twice is a no-op.
    pub fn delete(&self, who: &Principal, channel_id: Uuid, message_id: i64) -> ChatResult<()> {
        let auth = self.access.require_post(who, channel_id)?;
        let cid = channel_id.to_string();
        let existing = self
            .db
            .get_message(&cid, message_id)?
            .ok_or(ChatError::NotFound("message"))?;
        if existing.author_id != who.user_id.to_string() && !auth.access.manage {
            return Err(ChatError::Forbidden);
        }
        if existing.deleted {
            return Ok(());
        }

        let row = self
            .db
            .tombstone_message(&cid, message_id)?
            .ok_or(ChatError::NotFound("message"))?;
        info!("{} ({}) deleted {}/{}", who.username, who.user_id, channel_id, message_id);
        self.publish_update(row, who.user_id)?;
        Ok(())
    }

    fn live_message(&self, channel_id: &str, message_id: i64) -> ChatResult<MessageRow> {
        match self.db.get_message(channel_id, message_id)? {
            Some(row) if !row.deleted => Ok(row),
            _ => Err(ChatError::NotFound("message")),
        }
    }

    fn publish_update(&self, row: MessageRow, viewer: Uuid) -> ChatResult<MessageView> {
        let cid = row.channel_id.clone();
        let id = row.id;
        let message = row.into_message()?;
        self.sink.publish(ChannelEvent::MessageUpdate {
            message: message.clone(),
        });
        let tallies = tally(&self.db.reactions_for_message(&cid, id)?);
        Ok(MessageView {
            message,
            reactions: summarize(&tallies, viewer),
        })
    }

    fn with_reactions(&self, channel_id: &str, rows: Vec<MessageRow>, viewer: Uuid) -> ChatResult<Vec<MessageView>> {
        let (Some(first), Some(last)) = (rows.first().map(|r| r.id), rows.last().map(|r| r.id)) else {
            return Ok(Vec::new());
        };
        let (lo, hi) = (first.min(last), first.max(last));

        let mut by_message: HashMap<i64, Vec<_>> = HashMap::new();
        for reaction in self.db.reactions_in_range(channel_id, lo, hi)? {
            by_message.entry(reaction.message_id).or_default().push(reaction);
        }

        rows.into_iter()
            .map(|row| {
                let reactions = by_message
                    .get(&row.id)
                    .map(|rs| summarize(&tally(rs), viewer))
                    .unwrap_or_default();
                Ok(MessageView {
                    message: row.into_message()?,
                    reactions,
                })
            })
            .collect()
    }
}

fn encode_card(card: &DataCard) -> ChatResult<String> {
    serde_json::to_string(card).map_err(|e| ChatError::Storage(anyhow::anyhow!("failed to encode card: {}", e)))
}

fn is_image_filename(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
