use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row};

use super::OptionalExt;
use crate::Database;
use crate::models::{MessageRow, NewMessage, now_timestamp};

// JOIN users to fetch the author name in the same query (no N+1).
const MESSAGE_COLUMNS: &str = "SELECT m.channel_id, m.id, m.author_id,
        COALESCE(u.display_name, u.username, 'unknown'),
        m.body, m.message_type, m.attachment_url, m.attachment_filename, m.attachment_size,
        m.attachment_is_image, m.data_card, m.notice, m.pinned, m.parent_id, m.edited, m.deleted,
        m.created_at
     FROM messages m
     LEFT JOIN users u ON m.author_id = u.id";

impl Database {
    /// Append a message, assigning the channel's next id.
    ///
    /// The counter bump and the insert share one write transaction, and
    /// `(channel_id, id)` is the primary key, so two appends can never be
    /// handed the same id, across restarts or processes.
    ///
    /// `None` when the channel is gone or archived; nothing is written then.
    pub fn insert_message(&self, msg: &NewMessage<'_>) -> Result<Option<MessageRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let id: Option<i64> = tx
                .query_row(
                    "UPDATE channels SET last_message_id = last_message_id + 1
                     WHERE id = ?1 AND archived = 0
                     RETURNING last_message_id",
                    [msg.channel_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(id) = id else {
                return Ok(None);
            };

            let (url, filename, size, is_image) = match msg.attachment {
                Some(a) => (Some(a.url.as_str()), Some(a.filename.as_str()), Some(a.size as i64), a.is_image),
                None => (None, None, None, false),
            };

            tx.execute(
                "INSERT INTO messages
                    (channel_id, id, author_id, body, message_type, attachment_url, attachment_filename,
                     attachment_size, attachment_is_image, data_card, notice, parent_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                rusqlite::params![
                    msg.channel_id,
                    id,
                    msg.author_id,
                    msg.body,
                    msg.message_type,
                    url,
                    filename,
                    size,
                    is_image,
                    msg.data_card,
                    msg.notice,
                    msg.parent_id,
                    now_timestamp(),
                ],
            )?;

            let row = query_message(&tx, msg.channel_id, id)?
                .ok_or_else(|| anyhow!("Inserted message {}/{} vanished", msg.channel_id, id))?;
            tx.commit()?;
            Ok(Some(row))
        })
    }

    pub fn get_message(&self, channel_id: &str, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, channel_id, id))
    }

    /// Messages with id strictly above `cursor`, ascending, at most `limit`.
    pub fn messages_since(&self, channel_id: &str, cursor: i64, limit: usize) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE m.channel_id = ?1 AND m.id > ?2 ORDER BY m.id ASC LIMIT ?3",
                MESSAGE_COLUMNS
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![channel_id, cursor, limit as i64], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn pinned_messages(&self, channel_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE m.channel_id = ?1 AND m.pinned = 1 AND m.deleted = 0 ORDER BY m.id ASC",
                MESSAGE_COLUMNS
            ))?;
            let rows = stmt
                .query_map([channel_id], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn thread_messages(&self, channel_id: &str, parent_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE m.channel_id = ?1 AND m.parent_id = ?2 ORDER BY m.id ASC",
                MESSAGE_COLUMNS
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![channel_id, parent_id], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_message_body(&self, channel_id: &str, id: i64, body: &str) -> Result<Option<MessageRow>> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE messages SET body = ?3, edited = 1, edited_at = ?4
                 WHERE channel_id = ?1 AND id = ?2 AND deleted = 0",
                rusqlite::params![channel_id, id, body, now_timestamp()],
            )?;
            query_message(conn, channel_id, id)
        })
    }

    pub fn set_pinned(
        &self,
        channel_id: &str,
        id: i64,
        pinned: bool,
        pinned_by: &str,
    ) -> Result<Option<MessageRow>> {
        self.with_conn_mut(|conn| {
            let by = pinned.then_some(pinned_by);
            conn.execute(
                "UPDATE messages SET pinned = ?3, pinned_by = ?4 WHERE channel_id = ?1 AND id = ?2",
                rusqlite::params![channel_id, id, pinned, by],
            )?;
            query_message(conn, channel_id, id)
        })
    }

    /// Store the outcome of a deferred command lookup. Only applies while the
    /// message is still pending, so a late result cannot overwrite an edit or
    /// a tombstone.
    pub fn complete_command(
        &self,
        channel_id: &str,
        id: i64,
        message_type: &str,
        data_card: Option<String>,
        notice: Option<&str>,
    ) -> Result<Option<MessageRow>> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET message_type = ?3, data_card = ?4, notice = ?5
                 WHERE channel_id = ?1 AND id = ?2 AND message_type = 'command' AND deleted = 0",
                rusqlite::params![channel_id, id, message_type, data_card, notice],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_message(conn, channel_id, id)
        })
    }

    /// Soft delete: the row and its id stay, the content goes.
    pub fn tombstone_message(&self, channel_id: &str, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE messages SET
                    body = '', deleted = 1, pinned = 0, pinned_by = NULL, data_card = NULL, notice = NULL,
                    attachment_url = NULL, attachment_filename = NULL, attachment_size = NULL,
                    attachment_is_image = 0, message_type = 'text'
                 WHERE channel_id = ?1 AND id = ?2",
                rusqlite::params![channel_id, id],
            )?;
            tx.execute(
                "DELETE FROM reactions WHERE channel_id = ?1 AND message_id = ?2",
                rusqlite::params![channel_id, id],
            )?;
            let row = query_message(&tx, channel_id, id)?;
            tx.commit()?;
            Ok(row)
        })
    }
}

fn query_message(conn: &Connection, channel_id: &str, id: i64) -> Result<Option<MessageRow>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE m.channel_id = ?1 AND m.id = ?2",
        MESSAGE_COLUMNS
    ))?;
    stmt.query_row(rusqlite::params![channel_id, id], map_message)
        .optional()
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        channel_id: row.get(0)?,
        id: row.get(1)?,
        author_id: row.get(2)?,
        author_name: row.get(3)?,
        body: row.get(4)?,
        message_type: row.get(5)?,
        attachment_url: row.get(6)?,
        attachment_filename: row.get(7)?,
        attachment_size: row.get(8)?,
        attachment_is_image: row.get(9)?,
        data_card: row.get(10)?,
        notice: row.get(11)?,
        pinned: row.get(12)?,
        parent_id: row.get(13)?,
        edited: row.get(14)?,
        deleted: row.get(15)?,
        created_at: row.get(16)?,
    })
}
