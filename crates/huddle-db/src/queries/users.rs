use anyhow::Result;
use rusqlite::{Connection, Row};

use super::OptionalExt;
use crate::Database;
use crate::models::{UserRow, encode_roles, now_timestamp};

const USER_COLUMNS: &str = "SELECT id, username, display_name, roles, last_seen_at FROM users";

impl Database {
    /// Record the identity presented by a verified token. Identity itself is
    /// owned elsewhere; this keeps author names and roles available locally.
    pub fn upsert_user(
        &self,
        id: &str,
        username: &str,
        display_name: &str,
        roles: &[String],
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, display_name, roles, last_seen_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    username = excluded.username,
                    display_name = excluded.display_name,
                    roles = excluded.roles,
                    last_seen_at = excluded.last_seen_at",
                rusqlite::params![id, username, display_name, encode_roles(roles), now_timestamp()],
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, id))
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{} ORDER BY username", USER_COLUMNS))?;
            let rows = stmt
                .query_map([], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", USER_COLUMNS))?;
    stmt.query_row([id], map_user).optional()
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        roles: row.get(3)?,
        last_seen_at: row.get(4)?,
    })
}
