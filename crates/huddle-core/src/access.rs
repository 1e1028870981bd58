//! Access Control Evaluator.
//!
//! Decides, per (user, channel), whether the user may view, post, or manage.
//! Visibility of public channels is computed on read; only private and direct
//! channels have membership rows.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tracing::debug;
use uuid::Uuid;

use huddle_db::Database;
use huddle_types::models::{Channel, ChannelKind};

use crate::error::{ChatError, ChatResult};

/// The authenticated caller, as asserted by the identity service.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub username: String,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new(user_id: Uuid, username: impl Into<String>, roles: &[String]) -> Self {
        Self {
            user_id,
            username: username.into(),
            roles: normalize_roles(roles),
        }
    }
}

/// Lowercased, trimmed, deduplicated, sorted.
pub fn normalize_roles(roles: &[String]) -> Vec<String> {
    let mut out: Vec<String> = roles
        .iter()
        .map(|r| r.trim().to_lowercase())
        .filter(|r| !r.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelAccess {
    pub view: bool,
    pub post: bool,
    pub manage: bool,
}

/// Pure rule set. Holds no state beyond the configured role names.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    admin_roles: Vec<String>,
    creator_roles: Vec<String>,
}

impl AccessPolicy {
    pub fn new(admin_roles: &[String], creator_roles: &[String]) -> Self {
        Self {
            admin_roles: normalize_roles(admin_roles),
            creator_roles: normalize_roles(creator_roles),
        }
    }

    pub fn is_admin(&self, who: &Principal) -> bool {
        overlaps(&who.roles, &self.admin_roles)
    }

    /// Channel creation is gated by role alone, independent of any channel.
    pub fn can_create_channel(&self, who: &Principal) -> bool {
        self.is_admin(who) || overlaps(&who.roles, &self.creator_roles)
    }

    /// `is_member` is whether an explicit membership row exists.
    pub fn evaluate(&self, who: &Principal, channel: &Channel, is_member: bool) -> ChannelAccess {
        let admin = self.is_admin(who);
        let creator = channel.created_by == who.user_id;

        let view = match channel.kind {
            ChannelKind::Direct | ChannelKind::Private => is_member,
            ChannelKind::Public if !channel.restricted => true,
            ChannelKind::Public => {
                creator || admin || overlaps(&who.roles, &normalize_roles(&channel.allowed_roles))
            }
        };

        let manage = match channel.kind {
            ChannelKind::Direct => false,
            ChannelKind::Private => view && (creator || admin),
            ChannelKind::Public => creator || admin,
        };

        ChannelAccess {
            view,
            post: view && !channel.archived,
            manage,
        }
    }

    pub fn can_view(&self, who: &Principal, channel: &Channel, is_member: bool) -> bool {
        self.evaluate(who, channel, is_member).view
    }

    pub fn can_post(&self, who: &Principal, channel: &Channel, is_member: bool) -> bool {
        self.evaluate(who, channel, is_member).post
    }

    pub fn can_manage(&self, who: &Principal, channel: &Channel, is_member: bool) -> bool {
        self.evaluate(who, channel, is_member).manage
    }

    /// Whether a user with these roles qualifies for a public channel without
    /// an explicit membership row.
    pub fn implicitly_admits(&self, channel: &Channel, user_id: Uuid, roles: &[String]) -> bool {
        let who = Principal::new(user_id, "", roles);
        channel.kind == ChannelKind::Public && self.can_view(&who, channel, false)
    }
}

fn overlaps(a: &[String], b: &[String]) -> bool {
    a.iter().any(|role| b.contains(role))
}

struct CachedVisibility {
    roles: Vec<String>,
    channels: Arc<HashSet<Uuid>>,
}

#[derive(Default)]
struct CacheEntries {
    by_user: HashMap<Uuid, CachedVisibility>,
    /// Bumped by every invalidation. A set computed before a bump is never stored.
    generation: u64,
}

/// Per-user set of visible channel ids. Entries are dropped the moment a
/// membership or restriction changes, so reads never see a stale grant.
#[derive(Default)]
pub struct VisibilityCache {
    entries: RwLock<CacheEntries>,
}

impl VisibilityCache {
    /// Read before computing a set; pass it back to `put`.
    fn generation(&self) -> u64 {
        self.entries.read().map(|entries| entries.generation).unwrap_or(0)
    }

    fn get(&self, who: &Principal) -> Option<Arc<HashSet<Uuid>>> {
        let entries = self.entries.read().ok()?;
        entries
            .by_user
            .get(&who.user_id)
            .filter(|entry| entry.roles == who.roles)
            .map(|entry| entry.channels.clone())
    }

    /// Store `channels` unless something was invalidated since `generation`.
    fn put(&self, who: &Principal, channels: Arc<HashSet<Uuid>>, generation: u64) -> bool {
        let Ok(mut entries) = self.entries.write() else {
            return false;
        };
        if entries.generation != generation {
            return false;
        }
        entries.by_user.insert(
            who.user_id,
            CachedVisibility {
                roles: who.roles.clone(),
                channels,
            },
        );
        true
    }

    pub fn invalidate_user(&self, user_id: Uuid) {
        if let Ok(mut entries) = self.entries.write() {
            entries.generation += 1;
            entries.by_user.remove(&user_id);
        }
    }

    pub fn invalidate_all(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.generation += 1;
            entries.by_user.clear();
        }
    }
}

/// Resolved channel plus the caller's rights on it.
#[derive(Debug, Clone)]
pub struct Authorized {
    pub channel: Channel,
    pub access: ChannelAccess,
    pub is_member: bool,
}

/// Applies [`AccessPolicy`] against stored channels and memberships.
pub struct Evaluator {
    db: Arc<Database>,
    policy: AccessPolicy,
    cache: VisibilityCache,
}

impl Evaluator {
    pub fn new(db: Arc<Database>, policy: AccessPolicy) -> Self {
        Self {
            db,
            policy,
            cache: VisibilityCache::default(),
        }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    pub fn cache(&self) -> &VisibilityCache {
        &self.cache
    }

    /// Load a channel and the caller's rights on it. A missing channel and an
    /// invisible one both come back as [`ChatError::Forbidden`].
    pub fn authorize(&self, who: &Principal, channel_id: Uuid) -> ChatResult<Authorized> {
        let id = channel_id.to_string();
        let channel = self
            .db
            .get_channel(&id)?
            .ok_or(ChatError::Forbidden)?
            .into_channel()?;
        let is_member = self.db.is_member(&id, &who.user_id.to_string())?;
        let access = self.policy.evaluate(who, &channel, is_member);

        if !access.view {
            debug!("{} ({}) denied view on channel {}", who.username, who.user_id, channel_id);
            return Err(ChatError::Forbidden);
        }

        Ok(Authorized {
            channel,
            access,
            is_member,
        })
    }

    pub fn require_view(&self, who: &Principal, channel_id: Uuid) -> ChatResult<Authorized> {
        self.authorize(who, channel_id)
    }

    pub fn require_post(&self, who: &Principal, channel_id: Uuid) -> ChatResult<Authorized> {
        let auth = self.authorize(who, channel_id)?;
        if !auth.access.post {
            return Err(ChatError::Forbidden);
        }
        Ok(auth)
    }

    pub fn require_manage(&self, who: &Principal, channel_id: Uuid) -> ChatResult<Authorized> {
        let auth = self.authorize(who, channel_id)?;
        if !auth.access.manage {
            return Err(ChatError::Forbidden);
        }
        Ok(auth)
    }

    /// Every channel the caller can see, served from the cache when the
    /// caller's roles have not changed since it was filled.
    pub fn visible_channels(&self, who: &Principal) -> ChatResult<Arc<HashSet<Uuid>>> {
        if let Some(hit) = self.cache.get(who) {
            return Ok(hit);
        }
        let generation = self.cache.generation();

        let memberships = self.db.memberships_of(&who.user_id.to_string())?;
        let mut visible = HashSet::new();
        for row in self.db.list_channels()? {
            let is_member = memberships.contains(&row.id);
            let channel = row.into_channel()?;
            if self.policy.can_view(who, &channel, is_member) {
                visible.insert(channel.id);
            }
        }

        let visible = Arc::new(visible);
        if !self.cache.put(who, visible.clone(), generation) {
            debug!("Visibility of {} changed mid-read, not caching", who.user_id);
        }
        Ok(visible)
    }
}
