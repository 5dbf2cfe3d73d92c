use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use tandem_types::models::{ChatMessage, Notification};

/// The persistent-store collaborator as the gateway sees it.
///
/// Methods are synchronous; callers run them through `spawn_blocking` so the
/// event loop never blocks on a storage write. The gateway owns delivery,
/// never storage — this trait is the whole surface it needs.
pub trait ChatStore: Send + Sync + 'static {
    fn insert_message(&self, message: &ChatMessage) -> Result<()>;

    fn insert_notification(&self, notification: &Notification) -> Result<()>;

    fn upsert_read_receipt(&self, room_id: &str, user_id: Uuid, read_at: DateTime<Utc>)
    -> Result<()>;

    /// Refresh the profile row for an authenticated identity so history
    /// queries can resolve display names.
    fn upsert_profile(&self, user_id: Uuid, display_name: &str, role: &str) -> Result<()>;
}

impl ChatStore for tandem_db::Database {
    fn insert_message(&self, message: &ChatMessage) -> Result<()> {
        self.insert_message(
            &message.id.to_string(),
            &message.room_id,
            &message.sender_id.to_string(),
            match message.message_type {
                tandem_types::models::MessageType::Text => "text",
                tandem_types::models::MessageType::File => "file",
                tandem_types::models::MessageType::System => "system",
            },
            &message.body,
            message.file.as_ref().map(|f| f.url.as_str()),
            message.file.as_ref().map(|f| f.name.as_str()),
            message.file.as_ref().map(|f| f.size),
            &message.created_at.to_rfc3339(),
        )
    }

    fn insert_notification(&self, n: &Notification) -> Result<()> {
        self.insert_notification(
            &n.id.to_string(),
            &n.recipient_id.to_string(),
            &n.kind,
            &n.title,
            &n.body,
            &n.link,
            &n.related_id,
        )
    }

    fn upsert_read_receipt(
        &self,
        room_id: &str,
        user_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> Result<()> {
        self.upsert_read_receipt(room_id, &user_id.to_string(), &read_at.to_rfc3339())
    }

    fn upsert_profile(&self, user_id: Uuid, display_name: &str, role: &str) -> Result<()> {
        self.upsert_profile(&user_id.to_string(), display_name, role)
    }
}
