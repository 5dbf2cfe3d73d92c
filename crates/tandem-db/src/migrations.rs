use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS profiles (
            id            TEXT PRIMARY KEY,
            display_name  TEXT NOT NULL,
            role          TEXT NOT NULL DEFAULT 'member',
            created_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS messages (
            id            TEXT PRIMARY KEY,
            room_id       TEXT NOT NULL,
            sender_id     TEXT NOT NULL REFERENCES profiles(id),
            message_type  TEXT NOT NULL DEFAULT 'text',
            body          TEXT NOT NULL,
            file_url      TEXT,
            file_name     TEXT,
            file_size     INTEGER,
            edited        INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_room
            ON messages(room_id, created_at);

        CREATE TABLE IF NOT EXISTS notifications (
            id            TEXT PRIMARY KEY,
            recipient_id  TEXT NOT NULL REFERENCES profiles(id),
            kind          TEXT NOT NULL,
            title         TEXT NOT NULL,
            body          TEXT NOT NULL,
            link          TEXT NOT NULL,
            related_id    TEXT NOT NULL,
            created_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_recipient
            ON notifications(recipient_id, created_at);

        CREATE TABLE IF NOT EXISTS read_receipts (
            room_id       TEXT NOT NULL,
            user_id       TEXT NOT NULL REFERENCES profiles(id),
            last_read_at  TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (room_id, user_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
