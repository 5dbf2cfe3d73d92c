use crate::Database;
use crate::models::{MessageRow, NotificationRow, ProfileRow};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Profiles --

    pub fn upsert_profile(&self, id: &str, display_name: &str, role: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO profiles (id, display_name, role) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET display_name = ?2, role = ?3",
                (id, display_name, role),
            )?;
            Ok(())
        })
    }

    pub fn get_profile(&self, id: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| query_profile(conn, id))
    }

    // -- Messages --

    #[allow(clippy::too_many_arguments)]
    pub fn insert_message(
        &self,
        id: &str,
        room_id: &str,
        sender_id: &str,
        message_type: &str,
        body: &str,
        file_url: Option<&str>,
        file_name: Option<&str>,
        file_size: Option<u64>,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages
                     (id, room_id, sender_id, message_type, body,
                      file_url, file_name, file_size, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    id, room_id, sender_id, message_type, body, file_url, file_name, file_size,
                    created_at
                ],
            )?;
            Ok(())
        })
    }

    /// Messages for a room, newest first. This is the persistence fallback
    /// clients re-fetch after a reconnect.
    pub fn get_messages(&self, room_id: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, room_id, limit))
    }

    /// Out-of-band edit. Idempotent: editing to the same body again is a no-op
    /// beyond re-setting the edited flag.
    pub fn update_message_body(&self, id: &str, body: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET body = ?2, edited = 1 WHERE id = ?1",
                (id, body),
            )?;
            Ok(())
        })
    }

    /// Out-of-band delete. Idempotent: deleting an absent row is a no-op.
    pub fn delete_message(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    // -- Notifications --

    #[allow(clippy::too_many_arguments)]
    pub fn insert_notification(
        &self,
        id: &str,
        recipient_id: &str,
        kind: &str,
        title: &str,
        body: &str,
        link: &str,
        related_id: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, recipient_id, kind, title, body, link, related_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![id, recipient_id, kind, title, body, link, related_id],
            )?;
            Ok(())
        })
    }

    pub fn get_notifications(&self, recipient_id: &str, limit: u32) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, recipient_id, kind, title, body, link, related_id, created_at
                 FROM notifications
                 WHERE recipient_id = ?1
                 ORDER BY created_at DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![recipient_id, limit], |row| {
                    Ok(NotificationRow {
                        id: row.get(0)?,
                        recipient_id: row.get(1)?,
                        kind: row.get(2)?,
                        title: row.get(3)?,
                        body: row.get(4)?,
                        link: row.get(5)?,
                        related_id: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Read receipts --

    pub fn upsert_read_receipt(&self, room_id: &str, user_id: &str, read_at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO read_receipts (room_id, user_id, last_read_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(room_id, user_id) DO UPDATE SET last_read_at = ?3",
                (room_id, user_id, read_at),
            )?;
            Ok(())
        })
    }
}

fn query_profile(conn: &Connection, id: &str) -> Result<Option<ProfileRow>> {
    let mut stmt = conn.prepare("SELECT id, display_name, role FROM profiles WHERE id = ?1")?;

    let row = stmt
        .query_row([id], |row| {
            Ok(ProfileRow {
                id: row.get(0)?,
                display_name: row.get(1)?,
                role: row.get(2)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_messages(conn: &Connection, room_id: &str, limit: u32) -> Result<Vec<MessageRow>> {
    // JOIN profiles to fetch sender name and role in a single query
    let mut stmt = conn.prepare(
        "SELECT m.id, m.room_id, m.sender_id, p.display_name, p.role,
                m.message_type, m.body, m.file_url, m.file_name, m.file_size,
                m.edited, m.created_at
         FROM messages m
         LEFT JOIN profiles p ON m.sender_id = p.id
         WHERE m.room_id = ?1
         ORDER BY m.created_at DESC
         LIMIT ?2",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![room_id, limit], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                room_id: row.get(1)?,
                sender_id: row.get(2)?,
                sender_name: row
                    .get::<_, Option<String>>(3)?
                    .unwrap_or_else(|| "unknown".to_string()),
                sender_role: row
                    .get::<_, Option<String>>(4)?
                    .unwrap_or_else(|| "member".to_string()),
                message_type: row.get(5)?,
                body: row.get(6)?,
                file_url: row.get(7)?,
                file_name: row.get(8)?,
                file_size: row.get(9)?,
                edited: row.get::<_, i64>(10)? != 0,
                created_at: row.get(11)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
