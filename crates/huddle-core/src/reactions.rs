//! Reaction Aggregator: per-message emoji tallies with per-user toggle state.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use huddle_db::Database;
use huddle_db::models::ReactionRow;
use huddle_types::api::ReactionResponse;
use huddle_types::events::ChannelEvent;
use huddle_types::models::{ReactionSummary, ReactionTally};

use crate::access::{Evaluator, Principal};
use crate::error::{ChatError, ChatResult};
use crate::EventSink;

const MAX_EMOJI_BYTES: usize = 32;

pub struct ReactionAggregator {
    db: Arc<Database>,
    access: Arc<Evaluator>,
    sink: Arc<dyn EventSink>,
}

impl ReactionAggregator {
    pub fn new(db: Arc<Database>, access: Arc<Evaluator>, sink: Arc<dyn EventSink>) -> Self {
        Self { db, access, sink }
    }

    /// Add the reaction if absent, remove it if present. Toggling twice
    /// leaves the aggregate where it started.
    pub fn toggle(
        &self,
        who: &Principal,
        channel_id: Uuid,
        message_id: i64,
        emoji: &str,
    ) -> ChatResult<ReactionResponse> {
        let emoji = validate_emoji(emoji)?;
        // Archived channels are frozen: no new reactions either.
        self.access.require_post(who, channel_id)?;

        let cid = channel_id.to_string();
        let message = self
            .db
            .get_message(&cid, message_id)?
            .ok_or(ChatError::NotFound("message"))?;
        if message.deleted {
            return Err(ChatError::NotFound("message"));
        }

        let added = self
            .db
            .toggle_reaction(&cid, message_id, &who.user_id.to_string(), &emoji)?;
        debug!(
            "{} ({}) {} {} on {}/{}",
            who.username,
            who.user_id,
            if added { "added" } else { "removed" },
            emoji,
            channel_id,
            message_id
        );

        let rows = self.db.reactions_for_message(&cid, message_id)?;
        let tallies = tally(&rows);
        let reactions = summarize(&tallies, who.user_id);

        self.sink.publish(ChannelEvent::ReactionUpdate {
            channel_id,
            message_id,
            reactions: tallies,
        });

        Ok(ReactionResponse {
            message_id,
            added,
            reactions,
        })
    }
}

fn validate_emoji(raw: &str) -> ChatResult<String> {
    let emoji = raw.trim();
    if emoji.is_empty() || emoji.len() > MAX_EMOJI_BYTES {
        return Err(ChatError::validation("emoji must be 1-32 bytes"));
    }
    if emoji.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ChatError::validation("emoji must not contain whitespace"));
    }
    Ok(emoji.to_string())
}

/// Group rows by emoji, in order of each emoji's first use. Rows are expected
/// oldest first, as the database returns them.
pub fn tally(rows: &[ReactionRow]) -> Vec<ReactionTally> {
    let mut tallies: Vec<ReactionTally> = Vec::new();
    for row in rows {
        let Ok(user_id) = row.user_id.parse::<Uuid>() else {
            continue;
        };
        match tallies.iter_mut().find(|t| t.emoji == row.emoji) {
            Some(t) => t.user_ids.push(user_id),
            None => tallies.push(ReactionTally {
                emoji: row.emoji.clone(),
                user_ids: vec![user_id],
            }),
        }
    }
    tallies
}

pub fn summarize(tallies: &[ReactionTally], viewer: Uuid) -> Vec<ReactionSummary> {
    tallies.iter().map(|t| t.summary_for(viewer)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(message_id: i64, user: Uuid, emoji: &str) -> ReactionRow {
        ReactionRow {
            channel_id: "c".into(),
            message_id,
            user_id: user.to_string(),
            emoji: emoji.into(),
            created_at: String::new(),
        }
    }

    #[test]
    fn tallies_keep_first_use_order() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let rows = vec![row(1, a, "🎉"), row(1, b, "👍"), row(1, b, "🎉")];
        let tallies = tally(&rows);
        assert_eq!(tallies.len(), 2);
        assert_eq!(tallies[0].emoji, "🎉");
        assert_eq!(tallies[0].user_ids, vec![a, b]);

        let seen_by_a = summarize(&tallies, a);
        assert!(seen_by_a[0].reacted);
        assert!(!seen_by_a[1].reacted);
        assert_eq!(seen_by_a[1].count, 1);
    }

    #[test]
    fn emoji_validation() {
        assert!(validate_emoji(":shipit:").is_ok());
        assert!(validate_emoji("🇺🇸").is_ok());
        assert!(validate_emoji("  ").is_err());
        assert!(validate_emoji("a b").is_err());
        assert!(validate_emoji(&"x".repeat(40)).is_err());
    }
}
