pub mod connection;
pub mod dispatcher;
pub mod notify;
pub mod presence;
pub mod rooms;
pub mod router;
pub mod store;
pub mod typing;

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use tandem_types::events::ErrorCode;

use crate::dispatcher::Dispatcher;
use crate::notify::NotificationDispatcher;
use crate::presence::PresenceTracker;
use crate::rooms::RoomRegistry;
use crate::router::MessageRouter;
use crate::store::ChatStore;
use crate::typing::TypingCoordinator;

/// Identity bound to a connection after a successful authenticate.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
    pub role: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("user {user_id} is not a member of room {room_id}")]
    NotMember { room_id: String, user_id: Uuid },

    #[error("message rejected: {0}")]
    Validation(String),

    #[error("storage write failed: {0}")]
    Persistence(anyhow::Error),
}

impl GatewayError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotMember { .. } => ErrorCode::NotMember,
            Self::Validation(_) => ErrorCode::Validation,
            Self::Persistence(_) => ErrorCode::Persistence,
        }
    }
}

/// The real-time messaging coordinator: everything a connection loop needs.
///
/// Cheap to clone; all components share state through inner Arcs. One
/// `Gateway` exists per server process and is the single source of truth
/// for room membership, presence and typing state. All of that state is
/// ephemeral — a restarted server rebuilds it from fresh connect events.
#[derive(Clone)]
pub struct Gateway {
    pub dispatcher: Dispatcher,
    pub rooms: RoomRegistry,
    pub presence: PresenceTracker,
    pub typing: TypingCoordinator,
    pub router: MessageRouter,
    store: Arc<dyn ChatStore>,
    jwt_secret: Arc<str>,
}

impl Gateway {
    pub fn new(store: Arc<dyn ChatStore>, jwt_secret: &str) -> Self {
        let dispatcher = Dispatcher::new();
        let rooms = RoomRegistry::new();
        let notifier = NotificationDispatcher::new(store.clone());
        let router = MessageRouter::new(
            store.clone(),
            rooms.clone(),
            dispatcher.clone(),
            notifier,
        );

        Self {
            dispatcher,
            rooms,
            presence: PresenceTracker::new(),
            typing: TypingCoordinator::new(),
            router,
            store,
            jwt_secret: jwt_secret.into(),
        }
    }

    pub(crate) fn jwt_secret(&self) -> &str {
        &self.jwt_secret
    }

    pub(crate) fn store(&self) -> Arc<dyn ChatStore> {
        self.store.clone()
    }

    /// Deliver an event to every current member of a room, optionally
    /// skipping one member.
    pub async fn fan_out(
        &self,
        room_id: &str,
        event: tandem_types::events::ServerEvent,
        except: Option<Uuid>,
    ) {
        let mut members = self.rooms.members(room_id).await;
        if let Some(skip) = except {
            members.retain(|m| *m != skip);
        }
        self.dispatcher.send_to_users(&members, event).await;
    }

    /// Spawn the background sweep that expires stale typing entries, so a
    /// client that disconnects mid-type cannot leave a stuck indicator.
    pub fn start_typing_sweeper(&self) -> tokio::task::JoinHandle<()> {
        typing::spawn_sweeper(self.clone())
    }
}
