use anyhow::Result;
use rusqlite::Row;

use super::OptionalExt;
use crate::Database;
use crate::models::{ReactionRow, now_timestamp};

impl Database {
    /// Toggle a reaction: removes if it exists, inserts if not.
    /// Returns true when the reaction was added.
    pub fn toggle_reaction(
        &self,
        channel_id: &str,
        message_id: i64,
        user_id: &str,
        emoji: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM reactions
                     WHERE channel_id = ?1 AND message_id = ?2 AND user_id = ?3 AND emoji = ?4",
                    rusqlite::params![channel_id, message_id, user_id, emoji],
                    |row| row.get(0),
                )
                .optional()?;

            let added = if existing.is_some() {
                tx.execute(
                    "DELETE FROM reactions
                     WHERE channel_id = ?1 AND message_id = ?2 AND user_id = ?3 AND emoji = ?4",
                    rusqlite::params![channel_id, message_id, user_id, emoji],
                )?;
                false
            } else {
                tx.execute(
                    "INSERT INTO reactions (channel_id, message_id, user_id, emoji, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![channel_id, message_id, user_id, emoji, now_timestamp()],
                )?;
                true
            };

            tx.commit()?;
            Ok(added)
        })
    }

    /// Reactions of one message, oldest first.
    pub fn reactions_for_message(&self, channel_id: &str, message_id: i64) -> Result<Vec<ReactionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT channel_id, message_id, user_id, emoji, created_at FROM reactions
                 WHERE channel_id = ?1 AND message_id = ?2
                 ORDER BY created_at, rowid",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![channel_id, message_id], map_reaction)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch reactions for a contiguous id range of one channel.
    pub fn reactions_in_range(
        &self,
        channel_id: &str,
        first_id: i64,
        last_id: i64,
    ) -> Result<Vec<ReactionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT channel_id, message_id, user_id, emoji, created_at FROM reactions
                 WHERE channel_id = ?1 AND message_id BETWEEN ?2 AND ?3
                 ORDER BY created_at, rowid",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![channel_id, first_id, last_id], map_reaction)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_reaction(row: &Row<'_>) -> rusqlite::Result<ReactionRow> {
    Ok(ReactionRow {
        channel_id: row.get(0)?,
        message_id: row.get(1)?,
        user_id: row.get(2)?,
        emoji: row.get(3)?,
        created_at: row.get(4)?,
    })
}
