//! Channel Directory: channel records, membership, categories, archive state.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use huddle_db::Database;
use huddle_db::models::NewChannel;
use huddle_db::queries::is_unique_violation;
use huddle_types::api::{
    ChannelListResponse, ChannelSummary, CreateChannelRequest, MemberResponse, RestrictionRequest,
    UpdateChannelRequest,
};
use huddle_types::events::ChannelEvent;
use huddle_types::models::{Channel, ChannelKind, User};

use crate::access::{Authorized, ChannelAccess, Evaluator, Principal, normalize_roles};
use crate::error::{ChatError, ChatResult};
use crate::sanitize::sanitize_label;
use crate::EventSink;

const MAX_NAME_LEN: usize = 64;
const MAX_DISPLAY_NAME_LEN: usize = 100;
const MAX_CATEGORY_LEN: usize = 64;
const MAX_DESCRIPTION_LEN: usize = 1000;
const DEFAULT_CATEGORY: &str = "general";

pub struct ChannelDirectory {
    db: Arc<Database>,
    access: Arc<Evaluator>,
    sink: Arc<dyn EventSink>,
}

impl ChannelDirectory {
    pub fn new(db: Arc<Database>, access: Arc<Evaluator>, sink: Arc<dyn EventSink>) -> Self {
        Self { db, access, sink }
    }

    /// Channels the caller can see, partitioned by kind. Invisible channels
    /// are omitted, never reported.
    pub fn list(&self, who: &Principal) -> ChatResult<ChannelListResponse> {
        let visible = self.access.visible_channels(who)?;
        let memberships = self.db.memberships_of(&who.user_id.to_string())?;
        let counts = self.db.member_counts()?;
        let users = self.known_users()?;

        let mut out = ChannelListResponse {
            can_create_channel: self.access.policy().can_create_channel(who),
            ..Default::default()
        };

        for row in self.db.list_channels()? {
            let is_member = memberships.contains(&row.id);
            let channel = row.into_channel()?;
            if !visible.contains(&channel.id) {
                continue;
            }
            let access = self.access.policy().evaluate(who, &channel, is_member);
            if !access.view {
                continue;
            }

            let member_count = self.member_count(&channel, &counts, &users);
            let peer_name = match channel.kind {
                ChannelKind::Direct => self.peer_name(&channel, who.user_id)?,
                _ => None,
            };
            let summary = summarize(&channel, access, member_count, peer_name);
            match channel.kind {
                ChannelKind::Public => out.public.push(summary),
                ChannelKind::Private => out.private.push(summary),
                ChannelKind::Direct => out.direct.push(summary),
            }
        }

        Ok(out)
    }

    pub fn get(&self, who: &Principal, channel_id: Uuid) -> ChatResult<ChannelSummary> {
        let auth = self.access.require_view(who, channel_id)?;
        let counts = self.db.member_counts()?;
        let users = self.known_users()?;
        let member_count = self.member_count(&auth.channel, &counts, &users);
        let peer_name = match auth.channel.kind {
            ChannelKind::Direct => self.peer_name(&auth.channel, who.user_id)?,
            _ => None,
        };
        Ok(summarize(&auth.channel, auth.access, member_count, peer_name))
    }

    pub fn create(&self, who: &Principal, req: CreateChannelRequest) -> ChatResult<Channel> {
        if !self.access.policy().can_create_channel(who) {
            return Err(ChatError::Forbidden);
        }

        let name = validate_name(&req.name)?;
        let display_name = match req.display_name.as_deref() {
            Some(raw) => validate_label("display_name", raw, MAX_DISPLAY_NAME_LEN)?,
            None => name.clone(),
        };
        let category = match req.category.as_deref() {
            Some(raw) => validate_label("category", raw, MAX_CATEGORY_LEN)?,
            None => DEFAULT_CATEGORY.to_string(),
        };
        let description = req
            .description
            .as_deref()
            .map(validate_description)
            .transpose()?;

        let allowed_roles = normalize_roles(&req.allowed_roles);
        let members: Vec<String> = match req.kind {
            ChannelKind::Direct => {
                return Err(ChatError::validation("direct channels are opened, not created"));
            }
            ChannelKind::Public => {
                if !req.members.is_empty() {
                    return Err(ChatError::validation("public channels take no explicit members"));
                }
                if req.restricted && allowed_roles.is_empty() {
                    return Err(ChatError::validation("a restricted channel needs at least one role"));
                }
                Vec::new()
            }
            ChannelKind::Private => {
                if req.restricted || !allowed_roles.is_empty() {
                    return Err(ChatError::validation("only public channels can be role-restricted"));
                }
                let mut members = vec![who.user_id];
                for id in &req.members {
                    if self.db.get_user(&id.to_string())?.is_none() {
                        return Err(ChatError::NotFound("user"));
                    }
                    if !members.contains(id) {
                        members.push(*id);
                    }
                }
                members.iter().map(Uuid::to_string).collect()
            }
        };

        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let creator = who.user_id.to_string();
        let restricted = req.kind == ChannelKind::Public && req.restricted;
        let roles = if restricted { allowed_roles } else { Vec::new() };

        self.db
            .insert_channel(&NewChannel {
                id: &id_str,
                name: &name,
                display_name: &display_name,
                kind: req.kind.as_str(),
                category: &category,
                description: description.as_deref(),
                created_by: &creator,
                restricted,
                allowed_roles: &roles,
                members: &members,
                direct_key: None,
            })
            .map_err(|e| {
                if is_unique_violation(&e) {
                    ChatError::conflict(format!("channel name '{}' is taken", name))
                } else {
                    ChatError::Storage(e)
                }
            })?;

        self.access.cache().invalidate_all();
        info!("{} ({}) created {} channel #{} ({})", who.username, who.user_id, req.kind, name, id);

        self.load(id)
    }

    /// Return the direct channel between the caller and `other`, creating it
    /// with exactly those two members on first use.
    pub fn open_direct(&self, who: &Principal, other: Uuid) -> ChatResult<Channel> {
        if other == who.user_id {
            return Err(ChatError::validation("cannot open a direct channel with yourself"));
        }
        if self.db.get_user(&other.to_string())?.is_none() {
            return Err(ChatError::NotFound("user"));
        }

        let key = direct_key(who.user_id, other);
        if let Some(existing) = self.db.find_direct_channel(&key)? {
            let id: Uuid = existing
                .parse()
                .map_err(|e| ChatError::Storage(anyhow::anyhow!("corrupt channel id: {}", e)))?;
            return self.load(id);
        }

        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let name = format!("dm-{}", id.simple());
        let creator = who.user_id.to_string();
        let members = [creator.clone(), other.to_string()];

        let inserted = self.db.insert_channel(&NewChannel {
            id: &id_str,
            name: &name,
            display_name: "direct",
            kind: ChannelKind::Direct.as_str(),
            category: "direct",
            description: None,
            created_by: &creator,
            restricted: false,
            allowed_roles: &[],
            members: &members,
            direct_key: Some(&key),
        });

        match inserted {
            Ok(()) => {}
            // Lost a race with the other participant opening the same pair.
            Err(e) if is_unique_violation(&e) => {
                let existing = self
                    .db
                    .find_direct_channel(&key)?
                    .ok_or_else(|| ChatError::Storage(e))?;
                let id: Uuid = existing
                    .parse()
                    .map_err(|e| ChatError::Storage(anyhow::anyhow!("corrupt channel id: {}", e)))?;
                return self.load(id);
            }
            Err(e) => return Err(ChatError::Storage(e)),
        }

        self.access.cache().invalidate_user(who.user_id);
        self.access.cache().invalidate_user(other);
        info!("{} ({}) opened direct channel {} with {}", who.username, who.user_id, id, other);

        self.load(id)
    }

    pub fn update(&self, who: &Principal, channel_id: Uuid, req: UpdateChannelRequest) -> ChatResult<Channel> {
        self.access.require_manage(who, channel_id)?;

        let display_name = req
            .display_name
            .as_deref()
            .map(|raw| validate_label("display_name", raw, MAX_DISPLAY_NAME_LEN))
            .transpose()?;
        let category = req
            .category
            .as_deref()
            .map(|raw| validate_label("category", raw, MAX_CATEGORY_LEN))
            .transpose()?;
        let description = req.description.as_deref().map(validate_description).transpose()?;

        self.db.update_channel(
            &channel_id.to_string(),
            display_name.as_deref(),
            description.as_deref(),
            category.as_deref(),
        )?;
        self.sink.publish(ChannelEvent::ChannelUpdate { channel_id });
        self.load(channel_id)
    }

    /// Idempotent: returns false when the channel already had that state.
    pub fn set_archived(&self, who: &Principal, channel_id: Uuid, archived: bool) -> ChatResult<bool> {
        self.access.require_manage(who, channel_id)?;
        let changed = self.db.set_archived(&channel_id.to_string(), archived)?;
        if changed {
            self.access.cache().invalidate_all();
            info!(
                "{} ({}) {} channel {}",
                who.username,
                who.user_id,
                if archived { "archived" } else { "unarchived" },
                channel_id
            );
            self.sink.publish(ChannelEvent::ChannelUpdate { channel_id });
        }
        Ok(changed)
    }

    pub fn set_restriction(
        &self,
        who: &Principal,
        channel_id: Uuid,
        req: RestrictionRequest,
    ) -> ChatResult<Channel> {
        let auth = self.access.require_manage(who, channel_id)?;
        if auth.channel.kind != ChannelKind::Public {
            return Err(ChatError::validation("only public channels can be role-restricted"));
        }

        let roles = normalize_roles(&req.allowed_roles);
        if req.restricted && roles.is_empty() {
            return Err(ChatError::validation("a restricted channel needs at least one role"));
        }
        let roles = if req.restricted { roles } else { Vec::new() };

        self.db
            .set_restriction(&channel_id.to_string(), req.restricted, &roles)?;
        self.access.cache().invalidate_all();
        info!(
            "{} ({}) set restriction on {}: restricted={} roles={:?}",
            who.username, who.user_id, channel_id, req.restricted, roles
        );
        self.sink.publish(ChannelEvent::ChannelUpdate { channel_id });
        self.load(channel_id)
    }

    /// Hand the creator role to another member so the old creator can leave.
    pub fn transfer_ownership(&self, who: &Principal, channel_id: Uuid, new_owner: Uuid) -> ChatResult<Channel> {
        let auth = self.access.require_manage(who, channel_id)?;
        let cid = channel_id.to_string();
        let owner = new_owner.to_string();

        match auth.channel.kind {
            ChannelKind::Private => {
                if !self.db.is_member(&cid, &owner)? {
                    return Err(ChatError::validation("new owner must already be a member"));
                }
            }
            ChannelKind::Public => {
                if self.db.get_user(&owner)?.is_none() {
                    return Err(ChatError::NotFound("user"));
                }
            }
            ChannelKind::Direct => return Err(ChatError::Forbidden),
        }

        self.db.set_channel_owner(&cid, &owner)?;
        // Creator status grants visibility on restricted channels.
        self.access.cache().invalidate_all();
        info!("{} ({}) transferred {} to {}", who.username, who.user_id, channel_id, new_owner);
        self.sink.publish(ChannelEvent::ChannelUpdate { channel_id });
        self.load(channel_id)
    }

    pub fn members(&self, who: &Principal, channel_id: Uuid) -> ChatResult<Vec<MemberResponse>> {
        let auth = self.access.require_view(who, channel_id)?;
        let channel = &auth.channel;

        let members = match channel.kind {
            ChannelKind::Private | ChannelKind::Direct => self
                .db
                .list_members(&channel.id.to_string())?
                .into_iter()
                .filter_map(|row| {
                    let user_id = row.user_id.parse::<Uuid>().ok()?;
                    Some(MemberResponse {
                        user_id,
                        username: row.username,
                        display_name: row.display_name,
                        is_creator: user_id == channel.created_by,
                    })
                })
                .collect(),
            ChannelKind::Public => self
                .known_users()?
                .into_iter()
                .filter(|u| self.access.policy().implicitly_admits(channel, u.id, &u.roles))
                .map(|u| MemberResponse {
                    user_id: u.id,
                    is_creator: u.id == channel.created_by,
                    username: u.username,
                    display_name: u.display_name,
                })
                .collect(),
        };

        Ok(members)
    }

    /// Add an explicit member to a private channel. Adding an existing
    /// member is a no-op that returns false.
    pub fn add_member(&self, who: &Principal, channel_id: Uuid, user_id: Uuid) -> ChatResult<bool> {
        let auth = self.access.require_manage(who, channel_id)?;
        require_private(&auth)?;
        if self.db.get_user(&user_id.to_string())?.is_none() {
            return Err(ChatError::NotFound("user"));
        }

        let added = self.db.add_member(
            &channel_id.to_string(),
            &user_id.to_string(),
            &who.user_id.to_string(),
        )?;
        if added {
            self.access.cache().invalidate_user(user_id);
            info!("{} ({}) added {} to {}", who.username, who.user_id, user_id, channel_id);
            self.sink.publish(ChannelEvent::ChannelUpdate { channel_id });
        }
        Ok(added)
    }

    /// Remove a member from a private channel. Members may remove
    /// themselves; removing anyone else takes manage rights. The creator
    /// cannot be removed until ownership is transferred.
    pub fn remove_member(&self, who: &Principal, channel_id: Uuid, user_id: Uuid) -> ChatResult<bool> {
        let auth = if user_id == who.user_id {
            self.access.require_view(who, channel_id)?
        } else {
            self.access.require_manage(who, channel_id)?
        };
        require_private(&auth)?;

        if user_id == auth.channel.created_by {
            return Err(ChatError::conflict(
                "the channel creator cannot be removed; transfer ownership first",
            ));
        }

        let removed = self
            .db
            .remove_member(&channel_id.to_string(), &user_id.to_string())?;
        if removed {
            self.access.cache().invalidate_user(user_id);
            info!("{} ({}) removed {} from {}", who.username, who.user_id, user_id, channel_id);
            self.sink.publish(ChannelEvent::MemberRemoved { channel_id, user_id });
        }
        Ok(removed)
    }

    /// Delete the channel and, by cascade, its memberships, messages, and reactions.
    pub fn delete(&self, who: &Principal, channel_id: Uuid) -> ChatResult<()> {
        self.access.require_manage(who, channel_id)?;
        if !self.db.delete_channel(&channel_id.to_string())? {
            warn!("Channel {} vanished before delete", channel_id);
            return Err(ChatError::Forbidden);
        }
        self.access.cache().invalidate_all();
        info!("{} ({}) deleted channel {}", who.username, who.user_id, channel_id);
        self.sink.publish(ChannelEvent::ChannelDeleted { channel_id });
        Ok(())
    }

    pub fn known_users(&self) -> ChatResult<Vec<User>> {
        let mut users = Vec::new();
        for row in self.db.list_users()? {
            match row.into_user() {
                Ok(user) => users.push(user),
                Err(e) => warn!("Skipping corrupt user row: {}", e),
            }
        }
        Ok(users)
    }

    fn load(&self, channel_id: Uuid) -> ChatResult<Channel> {
        Ok(self
            .db
            .get_channel(&channel_id.to_string())?
            .ok_or(ChatError::Forbidden)?
            .into_channel()?)
    }

    fn member_count(&self, channel: &Channel, counts: &HashMap<String, usize>, users: &[User]) -> usize {
        match channel.kind {
            ChannelKind::Private | ChannelKind::Direct => {
                counts.get(&channel.id.to_string()).copied().unwrap_or(0)
            }
            ChannelKind::Public => users
                .iter()
                .filter(|u| self.access.policy().implicitly_admits(channel, u.id, &u.roles))
                .count(),
        }
    }

    fn peer_name(&self, channel: &Channel, me: Uuid) -> ChatResult<Option<String>> {
        let me = me.to_string();
        Ok(self
            .db
            .list_members(&channel.id.to_string())?
            .into_iter()
            .find(|m| m.user_id != me)
            .map(|m| m.display_name))
    }
}

fn summarize(
    channel: &Channel,
    access: ChannelAccess,
    member_count: usize,
    peer_name: Option<String>,
) -> ChannelSummary {
    ChannelSummary {
        id: channel.id,
        name: channel.name.clone(),
        display_name: channel.display_name.clone(),
        kind: channel.kind,
        category: channel.category.clone(),
        description: channel.description.clone(),
        created_by: channel.created_by,
        archived: channel.archived,
        restricted: channel.restricted,
        allowed_roles: channel.allowed_roles.clone(),
        member_count,
        last_message_id: channel.last_message_id,
        can_post: access.post,
        can_manage: access.manage,
        peer_name,
    }
}

fn require_private(auth: &Authorized) -> ChatResult<()> {
    match auth.channel.kind {
        ChannelKind::Private => Ok(()),
        ChannelKind::Public => Err(ChatError::validation(
            "public channel membership follows roles; restrict the channel instead",
        )),
        ChannelKind::Direct => Err(ChatError::validation("direct channel membership is fixed")),
    }
}

fn direct_key(a: Uuid, b: Uuid) -> String {
    if a < b {
        format!("{}:{}", a, b)
    } else {
        format!("{}:{}", b, a)
    }
}

fn validate_name(raw: &str) -> ChatResult<String> {
    let name = raw.trim().to_ascii_lowercase();
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(ChatError::validation("name must be 1-64 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(ChatError::validation(
            "name may only contain lowercase letters, digits, '-' and '_'",
        ));
    }
    if name.starts_with("dm-") {
        return Err(ChatError::validation("the dm- prefix is reserved"));
    }
    Ok(name)
}

fn validate_label(field: &str, raw: &str, max: usize) -> ChatResult<String> {
    let label = sanitize_label(raw);
    if label.is_empty() || label.chars().count() > max {
        return Err(ChatError::validation(format!("{} must be 1-{} characters", field, max)));
    }
    Ok(label)
}

fn validate_description(raw: &str) -> ChatResult<String> {
    let description = crate::sanitize::sanitize_body(raw);
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ChatError::validation("description is too long"));
    }
    Ok(description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[test]
    fn create_requires_creator_role_and_unique_name() {
        let fx = Fixture::new();
        let staff = fx.user("sam", &["staff"]);
        let manager = fx.user("mia", &["manager"]);

        let err = fx.directory.create(&staff, fx.public("ops")).unwrap_err();
        assert!(matches!(err, ChatError::Forbidden));

        let ch = fx.directory.create(&manager, fx.public("ops")).unwrap();
        assert_eq!(ch.kind, ChannelKind::Public);
        assert_eq!(ch.category, "general");

        let err = fx.directory.create(&manager, fx.public("OPS")).unwrap_err();
        assert!(matches!(err, ChatError::Conflict(_)));
    }

    #[test]
    fn list_partitions_and_omits_invisible() {
        let fx = Fixture::new();
        let mia = fx.user("mia", &["manager"]);
        let bob = fx.user("bob", &["staff"]);

        fx.directory.create(&mia, fx.public("lobby")).unwrap();
        fx.directory.create(&mia, fx.private("secret", &[])).unwrap();
        fx.directory.open_direct(&mia, bob.user_id).unwrap();

        let mine = fx.directory.list(&mia).unwrap();
        assert_eq!(mine.public.len(), 1);
        assert_eq!(mine.private.len(), 1);
        assert_eq!(mine.direct.len(), 1);
        assert!(mine.can_create_channel);
        assert_eq!(mine.direct[0].peer_name.as_deref(), Some("bob"));

        let bobs = fx.directory.list(&bob).unwrap();
        assert_eq!(bobs.public.len(), 1);
        assert!(bobs.private.is_empty());
        assert_eq!(bobs.direct.len(), 1);
        assert!(!bobs.can_create_channel);
    }

    #[test]
    fn restricted_visibility_follows_roles() {
        let fx = Fixture::new();
        let mia = fx.user("mia", &["manager"]);
        let seller = fx.user("sue", &["sales"]);
        let support = fx.user("sid", &["support"]);

        let mut req = fx.public("deals");
        req.restricted = true;
        req.allowed_roles = vec!["sales".into()];
        let ch = fx.directory.create(&mia, req).unwrap();

        assert_eq!(fx.directory.list(&seller).unwrap().public.len(), 1);
        assert!(fx.directory.list(&support).unwrap().public.is_empty());
        assert_eq!(fx.directory.list(&mia).unwrap().public.len(), 1);
        assert!(matches!(fx.directory.get(&support, ch.id), Err(ChatError::Forbidden)));

        // Lifting the restriction is visible immediately despite the cache.
        fx.directory
            .set_restriction(&mia, ch.id, RestrictionRequest { restricted: false, allowed_roles: vec![] })
            .unwrap();
        assert_eq!(fx.directory.list(&support).unwrap().public.len(), 1);
    }

    #[test]
    fn membership_changes_apply_immediately() {
        let fx = Fixture::new();
        let mia = fx.user("mia", &["manager"]);
        let bob = fx.user("bob", &[]);
        let ch = fx.directory.create(&mia, fx.private("inner", &[])).unwrap();

        assert!(fx.directory.list(&bob).unwrap().private.is_empty());
        assert!(fx.directory.add_member(&mia, ch.id, bob.user_id).unwrap());
        assert!(!fx.directory.add_member(&mia, ch.id, bob.user_id).unwrap());
        assert_eq!(fx.directory.list(&bob).unwrap().private.len(), 1);
        assert_eq!(fx.directory.get(&bob, ch.id).unwrap().member_count, 2);

        assert!(fx.directory.remove_member(&bob, ch.id, bob.user_id).unwrap());
        assert!(fx.directory.list(&bob).unwrap().private.is_empty());
    }

    #[test]
    fn creator_removal_needs_transfer() {
        let fx = Fixture::new();
        let mia = fx.user("mia", &["manager"]);
        let bob = fx.user("bob", &[]);
        let ch = fx.directory.create(&mia, fx.private("inner", &[bob.user_id])).unwrap();

        let err = fx.directory.remove_member(&mia, ch.id, mia.user_id).unwrap_err();
        assert!(matches!(err, ChatError::Conflict(_)));

        fx.directory.transfer_ownership(&mia, ch.id, bob.user_id).unwrap();
        assert!(fx.directory.remove_member(&mia, ch.id, mia.user_id).unwrap());
        assert!(matches!(fx.directory.get(&mia, ch.id), Err(ChatError::Forbidden)));
    }

    #[test]
    fn non_manager_cannot_manage() {
        let fx = Fixture::new();
        let mia = fx.user("mia", &["manager"]);
        let bob = fx.user("bob", &[]);
        let carl = fx.user("carl", &[]);
        let ch = fx.directory.create(&mia, fx.private("inner", &[bob.user_id])).unwrap();

        assert!(matches!(fx.directory.add_member(&bob, ch.id, carl.user_id), Err(ChatError::Forbidden)));
        assert!(matches!(fx.directory.set_archived(&bob, ch.id, true), Err(ChatError::Forbidden)));
        assert!(matches!(fx.directory.delete(&carl, ch.id), Err(ChatError::Forbidden)));
    }

    #[test]
    fn archive_is_idempotent() {
        let fx = Fixture::new();
        let mia = fx.user("mia", &["manager"]);
        let ch = fx.directory.create(&mia, fx.public("old")).unwrap();

        assert!(fx.directory.set_archived(&mia, ch.id, true).unwrap());
        assert!(!fx.directory.set_archived(&mia, ch.id, true).unwrap());
        assert!(fx.directory.set_archived(&mia, ch.id, false).unwrap());
    }

    #[test]
    fn direct_channel_is_reused_and_has_two_members() {
        let fx = Fixture::new();
        let a = fx.user("ann", &[]);
        let b = fx.user("ben", &[]);

        let first = fx.directory.open_direct(&a, b.user_id).unwrap();
        let second = fx.directory.open_direct(&b, a.user_id).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(fx.directory.members(&a, first.id).unwrap().len(), 2);

        assert!(matches!(fx.directory.open_direct(&a, a.user_id), Err(ChatError::Validation(_))));
        assert!(matches!(
            fx.directory.add_member(&a, first.id, Uuid::new_v4()),
            Err(ChatError::Forbidden)
        ));
    }

    #[test]
    fn delete_cascades_and_hides() {
        let fx = Fixture::new();
        let mia = fx.user("mia", &["manager"]);
        let ch = fx.directory.create(&mia, fx.public("temp")).unwrap();

        fx.directory.delete(&mia, ch.id).unwrap();
        assert!(fx.directory.list(&mia).unwrap().public.is_empty());
        assert!(matches!(fx.directory.get(&mia, ch.id), Err(ChatError::Forbidden)));
        assert!(fx.events().iter().any(|e| matches!(e, ChannelEvent::ChannelDeleted { .. })));
    }
}
