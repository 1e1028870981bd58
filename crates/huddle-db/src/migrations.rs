use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id            TEXT PRIMARY KEY,
                username      TEXT NOT NULL,
                display_name  TEXT NOT NULL,
                roles         TEXT NOT NULL DEFAULT '[]',
                last_seen_at  TEXT NOT NULL
            );

            CREATE TABLE channels (
                id               TEXT PRIMARY KEY,
                name             TEXT NOT NULL UNIQUE,
                display_name     TEXT NOT NULL,
                kind             TEXT NOT NULL CHECK (kind IN ('public', 'private', 'direct')),
                category         TEXT NOT NULL DEFAULT 'general',
                description      TEXT,
                created_by       TEXT NOT NULL,
                archived         INTEGER NOT NULL DEFAULT 0,
                restricted       INTEGER NOT NULL DEFAULT 0,
                -- Source of per-channel message ids; bumped inside the insert transaction.
                last_message_id  INTEGER NOT NULL DEFAULT 0,
                -- Sorted participant pair, set only for direct channels.
                direct_key       TEXT UNIQUE,
                created_at       TEXT NOT NULL
            );

            CREATE TABLE channel_allowed_roles (
                channel_id  TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
                role        TEXT NOT NULL,
                PRIMARY KEY (channel_id, role)
            );

            CREATE TABLE channel_members (
                channel_id  TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL,
                added_by    TEXT,
                joined_at   TEXT NOT NULL,
                PRIMARY KEY (channel_id, user_id)
            );

            CREATE INDEX idx_channel_members_user
                ON channel_members(user_id);

            CREATE TABLE messages (
                channel_id           TEXT NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
                id                   INTEGER NOT NULL,
                author_id            TEXT NOT NULL,
                body                 TEXT NOT NULL,
                message_type         TEXT NOT NULL DEFAULT 'text',
                attachment_url       TEXT,
                attachment_filename  TEXT,
                attachment_size      INTEGER,
                attachment_is_image  INTEGER NOT NULL DEFAULT 0,
                data_card            TEXT,
                notice               TEXT,
                pinned               INTEGER NOT NULL DEFAULT 0,
                pinned_by            TEXT,
                parent_id            INTEGER,
                edited               INTEGER NOT NULL DEFAULT 0,
                edited_at            TEXT,
                deleted              INTEGER NOT NULL DEFAULT 0,
                created_at           TEXT NOT NULL,
                PRIMARY KEY (channel_id, id)
            );

            CREATE INDEX idx_messages_parent
                ON messages(channel_id, parent_id)
                WHERE parent_id IS NOT NULL;

            CREATE TABLE reactions (
                channel_id  TEXT NOT NULL,
                message_id  INTEGER NOT NULL,
                user_id     TEXT NOT NULL,
                emoji       TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (channel_id, message_id, user_id, emoji),
                FOREIGN KEY (channel_id, message_id)
                    REFERENCES messages(channel_id, id) ON DELETE CASCADE
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
