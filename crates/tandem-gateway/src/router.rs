use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use tandem_types::events::ServerEvent;
use tandem_types::models::{ChatMessage, FileDescriptor, MessageType};

use crate::dispatcher::Dispatcher;
use crate::notify::NotificationDispatcher;
use crate::rooms::RoomRegistry;
use crate::store::ChatStore;
use crate::{GatewayError, Identity};

/// Accepts an outbound message, validates membership, stamps server metadata,
/// persists, and fans the stamped message out to every current room member.
///
/// The sender is included in the fan-out on purpose: their UI renders the
/// canonical server state (final id and timestamp) instead of an optimistic
/// local copy.
///
/// Per-sender FIFO holds because each connection handles its commands on a
/// single task and `send` completes the persist + fan-out before the next
/// command is read.
#[derive(Clone)]
pub struct MessageRouter {
    store: Arc<dyn ChatStore>,
    rooms: RoomRegistry,
    dispatcher: Dispatcher,
    notifier: NotificationDispatcher,
}

impl MessageRouter {
    pub fn new(
        store: Arc<dyn ChatStore>,
        rooms: RoomRegistry,
        dispatcher: Dispatcher,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            rooms,
            dispatcher,
            notifier,
        }
    }

    /// Route one message. On error the message is dropped — never persisted,
    /// never delivered; the caller reports the failure to the sender only.
    pub async fn send(
        &self,
        sender: &Identity,
        room_id: &str,
        body: String,
        message_type: MessageType,
        file: Option<FileDescriptor>,
    ) -> Result<ChatMessage, GatewayError> {
        validate(&body, message_type, file.as_ref())?;

        if !self.rooms.is_member(room_id, sender.user_id).await {
            return Err(GatewayError::NotMember {
                room_id: room_id.to_string(),
                user_id: sender.user_id,
            });
        }

        let message = ChatMessage {
            id: Uuid::new_v4(),
            room_id: room_id.to_string(),
            sender_id: sender.user_id,
            sender_name: sender.username.clone(),
            sender_role: sender.role.clone(),
            message_type,
            body,
            file,
            created_at: Utc::now(),
            edited: false,
        };

        // Persist before fan-out: a message that fails to write is never seen
        // by anyone, including the sender.
        let store = self.store.clone();
        let to_persist = message.clone();
        tokio::task::spawn_blocking(move || store.insert_message(&to_persist))
            .await
            .map_err(|e| GatewayError::Persistence(anyhow!("storage task failed: {e}")))?
            .map_err(GatewayError::Persistence)?;

        let members = self.rooms.members(room_id).await;
        debug!(
            "routing message {} from {} to {} members of {}",
            message.id,
            sender.username,
            members.len(),
            room_id
        );
        self.dispatcher
            .send_to_users(
                &members,
                ServerEvent::NewMessage {
                    message: message.clone(),
                },
            )
            .await;

        let recipients: Vec<Uuid> = members
            .into_iter()
            .filter(|m| *m != sender.user_id)
            .collect();
        self.notifier.dispatch(&message, recipients);

        Ok(message)
    }
}

fn validate(
    body: &str,
    message_type: MessageType,
    file: Option<&FileDescriptor>,
) -> Result<(), GatewayError> {
    match message_type {
        MessageType::Text | MessageType::System => {
            if body.trim().is_empty() {
                return Err(GatewayError::Validation("empty message body".into()));
            }
        }
        MessageType::File => {
            if file.is_none() {
                return Err(GatewayError::Validation(
                    "file message without file descriptor".into(),
                ));
            }
        }
    }
    Ok(())
}
