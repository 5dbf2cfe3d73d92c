use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChatMessage, FileDescriptor, MessageType};

/// Commands sent FROM client TO server over the WebSocket.
///
/// Sender identity is never carried in command payloads — the gateway binds
/// identity to the connection during `authenticate` and stamps it server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientCommand {
    /// Bind this connection to an identity. Must be the first command;
    /// re-sent by the client after every reconnect.
    Authenticate { token: String },

    JoinRoom { room_id: String },

    LeaveRoom { room_id: String },

    SendMessage {
        room_id: String,
        body: String,
        message_type: MessageType,
        #[serde(skip_serializing_if = "Option::is_none")]
        file: Option<FileDescriptor>,
    },

    TypingStart { room_id: String },

    TypingStop { room_id: String },

    /// Mark every message in the room as read by the sender.
    MarkRead { room_id: String },

    /// Application-level heartbeat. Keeps intermediary proxies from idling
    /// the connection out; the pong reply is observational only.
    Ping,
}

/// Events sent FROM server TO clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Authentication succeeded; the connection is bound to this identity.
    Ready { user_id: Uuid, username: String },

    /// Fan-out of a stamped message to every current room member,
    /// including the sender.
    NewMessage { message: ChatMessage },

    UserTyping {
        room_id: String,
        user_id: Uuid,
        username: String,
    },

    UserStoppedTyping { room_id: String, user_id: Uuid },

    UserOnline { user_id: Uuid, username: String },

    UserOffline { user_id: Uuid },

    MessagesRead { room_id: String, user_id: Uuid },

    /// Delivery failure notice, sent to the offending sender only.
    MessageError { code: ErrorCode, message: String },

    Pong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    NotMember,
    Persistence,
    Validation,
}
