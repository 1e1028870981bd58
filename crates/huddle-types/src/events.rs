use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, ReactionTally};

/// Events fanned out to live subscribers of a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChannelEvent {
    /// A new message was appended
    MessageCreate { message: Message },

    /// An existing message was edited, pinned, tombstoned, or had its card resolved
    MessageUpdate { message: Message },

    /// The reaction set of a message changed
    ReactionUpdate {
        channel_id: Uuid,
        message_id: i64,
        reactions: Vec<ReactionTally>,
    },

    /// Archive state, restriction, or metadata changed
    ChannelUpdate { channel_id: Uuid },

    /// The channel and its history are gone
    ChannelDeleted { channel_id: Uuid },

    /// A user lost access to the channel
    MemberRemoved { channel_id: Uuid, user_id: Uuid },
}

impl ChannelEvent {
    pub fn channel_id(&self) -> Uuid {
        match self {
            Self::MessageCreate { message } | Self::MessageUpdate { message } => message.channel_id,
            Self::ReactionUpdate { channel_id, .. }
            | Self::ChannelUpdate { channel_id }
            | Self::ChannelDeleted { channel_id }
            | Self::MemberRemoved { channel_id, .. } => *channel_id,
        }
    }

    /// Name used for the SSE `event:` field.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::MessageCreate { .. } => "messages",
            Self::MessageUpdate { .. } => "message_update",
            Self::ReactionUpdate { .. } => "reactions",
            Self::ChannelUpdate { .. } => "channel_update",
            Self::ChannelDeleted { .. } | Self::MemberRemoved { .. } => "closed",
        }
    }
}
