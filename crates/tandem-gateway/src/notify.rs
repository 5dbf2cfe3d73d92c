use std::sync::Arc;

use chrono::Utc;
use tracing::{error, warn};
use uuid::Uuid;

use tandem_types::models::{ChatMessage, Notification};

use crate::store::ChatStore;

/// Notification bodies are previews, truncated to this many characters.
const BODY_PREVIEW_LIMIT: usize = 50;

/// Writes notification records for room members who should hear about a
/// message out-of-band.
///
/// Strictly fire-and-forget relative to the send path: the work runs on a
/// spawned task, and a failed write is logged, never propagated — a
/// notification must not fail or delay a message send.
#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn ChatStore>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    /// Enqueue one notification per recipient for a delivered message.
    pub fn dispatch(&self, message: &ChatMessage, recipients: Vec<Uuid>) {
        if recipients.is_empty() {
            return;
        }
        let store = self.store.clone();
        let message = message.clone();

        tokio::spawn(async move {
            let join = tokio::task::spawn_blocking(move || {
                for recipient_id in recipients {
                    let notification = Notification {
                        id: Uuid::new_v4(),
                        recipient_id,
                        kind: "chat".to_string(),
                        title: format!("New message from {}", message.sender_name),
                        body: preview(&message.body),
                        link: format!("/projects/{}/chat", message.room_id),
                        related_id: message.room_id.clone(),
                        created_at: Utc::now(),
                    };
                    if let Err(e) = store.insert_notification(&notification) {
                        warn!(
                            "failed to write notification for {} (message {}): {}",
                            recipient_id, message.id, e
                        );
                    }
                }
            })
            .await;

            if let Err(e) = join {
                error!("notification task panicked: {}", e);
            }
        });
    }
}

/// First `BODY_PREVIEW_LIMIT` characters of the body, with an ellipsis when
/// anything was cut. Counts characters, not bytes, so multibyte text never
/// splits mid-codepoint.
fn preview(body: &str) -> String {
    if body.chars().count() <= BODY_PREVIEW_LIMIT {
        body.to_string()
    } else {
        let mut out: String = body.chars().take(BODY_PREVIEW_LIMIT).collect();
        out.push_str("...");
        out
    }
}
