/// Database row types — these map directly to SQLite rows.
/// Distinct from tandem-types API models to keep the DB layer independent.

pub struct ProfileRow {
    pub id: String,
    pub display_name: String,
    pub role: String,
}

pub struct MessageRow {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: String,
    pub message_type: String,
    pub body: String,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub edited: bool,
    pub created_at: String,
}

pub struct NotificationRow {
    pub id: String,
    pub recipient_id: String,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub link: String,
    pub related_id: String,
    pub created_at: String,
}
