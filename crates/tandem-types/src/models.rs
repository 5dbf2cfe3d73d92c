use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user profile as seen by the messaging layer. Profile storage is owned
/// externally; this is the slice the gateway needs for display names and
/// notification titles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub display_name: String,
    pub role: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    File,
    System,
}

/// Descriptor for a file that was already uploaded to object storage.
/// The router never touches file bytes — upload completes before send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub url: String,
    pub name: String,
    pub size: u64,
}

/// A fully-stamped chat message as broadcast to room members and persisted.
/// `id` and `created_at` are always server-assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: String,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub sender_role: String,
    pub message_type: MessageType,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileDescriptor>,
    pub created_at: DateTime<Utc>,
    pub edited: bool,
}

/// A persisted notification record for a room member who should hear about
/// a message out-of-band (badge counts, notification center).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub link: String,
    pub related_id: String,
    pub created_at: DateTime<Utc>,
}
