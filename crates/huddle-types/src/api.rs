use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChannelKind, MessageView, ReactionSummary};

// -- JWT Claims --

/// Claims issued by the identity service. Shared by the REST middleware and
/// the stream endpoint; `roles` drive channel creation and restricted access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub exp: usize,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

// -- Channels --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChannelRequest {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub kind: ChannelKind,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub restricted: bool,
    #[serde(default)]
    pub allowed_roles: Vec<String>,
    /// Initial members of a private channel; the creator is always added.
    #[serde(default)]
    pub members: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenDirectRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateChannelRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RestrictionRequest {
    pub restricted: bool,
    #[serde(default)]
    pub allowed_roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferOwnerRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub kind: ChannelKind,
    pub category: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub archived: bool,
    pub restricted: bool,
    pub allowed_roles: Vec<String>,
    pub member_count: usize,
    pub last_message_id: i64,
    pub can_post: bool,
    pub can_manage: bool,
    /// Display name of the other participant, for direct channels.
    pub peer_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelListResponse {
    pub public: Vec<ChannelSummary>,
    pub private: Vec<ChannelSummary>,
    pub direct: Vec<ChannelSummary>,
    pub can_create_channel: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberResponse {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub is_creator: bool,
}

/// Result of an idempotent mutation: `changed` is false when it was a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeResponse {
    pub changed: bool,
}

// -- Messages --

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub cursor: i64,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub messages: Vec<MessageView>,
    pub has_more: bool,
    /// Id of the last message returned, or the request cursor when empty.
    pub last_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttachmentInput {
    pub url: String,
    pub filename: String,
    pub size: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub attachment: Option<AttachmentInput>,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditMessageRequest {
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PinResponse {
    pub pinned: bool,
}

// -- Reactions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToggleReactionRequest {
    pub emoji: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionResponse {
    pub message_id: i64,
    pub added: bool,
    pub reactions: Vec<ReactionSummary>,
}

// -- Users --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
}
