use std::collections::{HashMap, HashSet};

use anyhow::Result;
use rusqlite::{Connection, Row};

use super::OptionalExt;
use crate::Database;
use crate::models::{ChannelRow, MemberRow, NewChannel, now_timestamp};

const CHANNEL_COLUMNS: &str = "SELECT id, name, display_name, kind, category, description, created_by,
        archived, restricted, last_message_id, created_at
     FROM channels";

impl Database {
    // -- Channels --

    /// Insert a channel together with its allowed roles and initial members.
    pub fn insert_channel(&self, channel: &NewChannel<'_>) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = now_timestamp();

            tx.execute(
                "INSERT INTO channels
                    (id, name, display_name, kind, category, description, created_by, restricted, direct_key, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    channel.id,
                    channel.name,
                    channel.display_name,
                    channel.kind,
                    channel.category,
                    channel.description,
                    channel.created_by,
                    channel.restricted,
                    channel.direct_key,
                    now,
                ],
            )?;

            for role in channel.allowed_roles {
                tx.execute(
                    "INSERT OR IGNORE INTO channel_allowed_roles (channel_id, role) VALUES (?1, ?2)",
                    (channel.id, role),
                )?;
            }

            for member in channel.members {
                tx.execute(
                    "INSERT OR IGNORE INTO channel_members (channel_id, user_id, added_by, joined_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    (channel.id, member, channel.created_by, &now),
                )?;
            }

            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_channel(&self, id: &str) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", CHANNEL_COLUMNS))?;
            let Some(mut row) = stmt.query_row([id], map_channel).optional()? else {
                return Ok(None);
            };
            row.allowed_roles = query_allowed_roles(conn, id)?;
            Ok(Some(row))
        })
    }

    pub fn find_direct_channel(&self, direct_key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id FROM channels WHERE direct_key = ?1",
                [direct_key],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Every channel with its allowed roles. Visibility filtering is the
    /// caller's job; nothing here is per-user.
    pub fn list_channels(&self) -> Result<Vec<ChannelRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{} ORDER BY category, name", CHANNEL_COLUMNS))?;
            let mut rows = stmt
                .query_map([], map_channel)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut roles: HashMap<String, Vec<String>> = HashMap::new();
            let mut stmt =
                conn.prepare("SELECT channel_id, role FROM channel_allowed_roles ORDER BY role")?;
            let pairs = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get(1)?)))?;
            for pair in pairs {
                let (channel_id, role) = pair?;
                roles.entry(channel_id).or_default().push(role);
            }

            for row in &mut rows {
                row.allowed_roles = roles.remove(&row.id).unwrap_or_default();
            }
            Ok(rows)
        })
    }

    pub fn update_channel(
        &self,
        id: &str,
        display_name: Option<&str>,
        description: Option<&str>,
        category: Option<&str>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE channels SET
                    display_name = COALESCE(?2, display_name),
                    description = COALESCE(?3, description),
                    category = COALESCE(?4, category)
                 WHERE id = ?1",
                rusqlite::params![id, display_name, description, category],
            )?;
            Ok(changed > 0)
        })
    }

    /// Returns false when the channel was already in the requested state.
    pub fn set_archived(&self, id: &str, archived: bool) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE channels SET archived = ?2 WHERE id = ?1 AND archived != ?2",
                rusqlite::params![id, archived],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn set_restriction(&self, id: &str, restricted: bool, roles: &[String]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE channels SET restricted = ?2 WHERE id = ?1",
                rusqlite::params![id, restricted],
            )?;
            tx.execute("DELETE FROM channel_allowed_roles WHERE channel_id = ?1", [id])?;
            for role in roles {
                tx.execute(
                    "INSERT OR IGNORE INTO channel_allowed_roles (channel_id, role) VALUES (?1, ?2)",
                    (id, role),
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn set_channel_owner(&self, id: &str, user_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute("UPDATE channels SET created_by = ?2 WHERE id = ?1", (id, user_id))?;
            Ok(())
        })
    }

    /// Deletes the channel; members, messages, and reactions go with it.
    pub fn delete_channel(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("DELETE FROM channels WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    // -- Membership --

    /// Returns false when the user was already a member.
    pub fn add_member(&self, channel_id: &str, user_id: &str, added_by: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO channel_members (channel_id, user_id, added_by, joined_at)
                 VALUES (?1, ?2, ?3, ?4)",
                (channel_id, user_id, added_by, now_timestamp()),
            )?;
            Ok(changed > 0)
        })
    }

    /// Returns false when the user was not a member.
    pub fn remove_member(&self, channel_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "DELETE FROM channel_members WHERE channel_id = ?1 AND user_id = ?2",
                (channel_id, user_id),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn is_member(&self, channel_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM channel_members WHERE channel_id = ?1 AND user_id = ?2",
                    (channel_id, user_id),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Channel ids the user holds an explicit membership row for.
    pub fn memberships_of(&self, user_id: &str) -> Result<HashSet<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT channel_id FROM channel_members WHERE user_id = ?1")?;
            let ids = stmt
                .query_map([user_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<HashSet<_>, _>>()?;
            Ok(ids)
        })
    }

    pub fn list_members(&self, channel_id: &str) -> Result<Vec<MemberRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT cm.user_id, COALESCE(u.username, cm.user_id), COALESCE(u.display_name, u.username, 'unknown')
                 FROM channel_members cm
                 LEFT JOIN users u ON cm.user_id = u.id
                 WHERE cm.channel_id = ?1
                 ORDER BY cm.joined_at, cm.user_id",
            )?;
            let rows = stmt
                .query_map([channel_id], |row| {
                    Ok(MemberRow {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        display_name: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Explicit membership counts keyed by channel id.
    pub fn member_counts(&self) -> Result<HashMap<String, usize>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT channel_id, COUNT(*) FROM channel_members GROUP BY channel_id")?;
            let counts = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
                })?
                .collect::<std::result::Result<HashMap<_, _>, _>>()?;
            Ok(counts)
        })
    }
}

fn query_allowed_roles(conn: &Connection, channel_id: &str) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT role FROM channel_allowed_roles WHERE channel_id = ?1 ORDER BY role")?;
    let roles = stmt
        .query_map([channel_id], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(roles)
}

fn map_channel(row: &Row<'_>) -> rusqlite::Result<ChannelRow> {
    Ok(ChannelRow {
        id: row.get(0)?,
        name: row.get(1)?,
        display_name: row.get(2)?,
        kind: row.get(3)?,
        category: row.get(4)?,
        description: row.get(5)?,
        created_by: row.get(6)?,
        archived: row.get(7)?,
        restricted: row.get(8)?,
        allowed_roles: Vec::new(),
        last_message_id: row.get(9)?,
        created_at: row.get(10)?,
    })
}
