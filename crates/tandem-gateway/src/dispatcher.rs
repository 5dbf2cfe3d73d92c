use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use tandem_types::events::ServerEvent;

/// Delivery channels for all connected clients.
///
/// One unbounded sender per user — the single-connection-per-user policy:
/// registering a new channel for a user supersedes the old one, and teardown
/// is guarded by the connection id so a stale connection cannot tear down its
/// replacement. Sends are fire-and-forget; a gone receiver just drops the
/// event.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// user_id -> (conn_id, sender)
    user_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<ServerEvent>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register the delivery channel for a user's connection.
    /// Returns (conn_id, receiver); any previous channel is superseded.
    pub async fn register_user_channel(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Unregister a user's channel, but only if conn_id still owns it.
    pub async fn unregister_user_channel(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some((stored_conn_id, _)) = channels.get(&user_id)
            && *stored_conn_id == conn_id
        {
            channels.remove(&user_id);
        }
    }

    /// Whether conn_id is still the live connection for this user.
    pub async fn is_current(&self, user_id: Uuid, conn_id: Uuid) -> bool {
        self.inner
            .user_channels
            .read()
            .await
            .get(&user_id)
            .is_some_and(|(cid, _)| *cid == conn_id)
    }

    /// Send a targeted event to a single user. No-op if they are gone.
    pub async fn send_to_user(&self, user_id: Uuid, event: ServerEvent) {
        let channels = self.inner.user_channels.read().await;
        if let Some((_, tx)) = channels.get(&user_id) {
            let _ = tx.send(event);
        }
    }

    /// Fan an event out to a set of users. A gone member never aborts
    /// delivery to the rest.
    pub async fn send_to_users(&self, user_ids: &[Uuid], event: ServerEvent) {
        let channels = self.inner.user_channels.read().await;
        for user_id in user_ids {
            if let Some((_, tx)) = channels.get(user_id) {
                let _ = tx.send(event.clone());
            }
        }
    }

    /// Send an event to every connected client (presence updates).
    pub async fn broadcast(&self, event: ServerEvent) {
        let channels = self.inner.user_channels.read().await;
        for (_, tx) in channels.values() {
            let _ = tx.send(event.clone());
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_connection_supersedes_old_channel() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::from_u128(1);

        let (old_conn, mut old_rx) = dispatcher.register_user_channel(user).await;
        let (new_conn, mut new_rx) = dispatcher.register_user_channel(user).await;

        dispatcher.send_to_user(user, ServerEvent::Pong).await;
        assert!(new_rx.try_recv().is_ok());
        assert!(old_rx.try_recv().is_err());

        // Stale connection's teardown must not remove the new channel
        dispatcher.unregister_user_channel(user, old_conn).await;
        assert!(dispatcher.is_current(user, new_conn).await);

        dispatcher.unregister_user_channel(user, new_conn).await;
        assert!(!dispatcher.is_current(user, new_conn).await);
    }

    #[tokio::test]
    async fn fan_out_skips_gone_members_without_aborting() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::from_u128(1);
        let bob = Uuid::from_u128(2);
        let gone = Uuid::from_u128(3);

        let (_, mut alice_rx) = dispatcher.register_user_channel(alice).await;
        let (_, mut bob_rx) = dispatcher.register_user_channel(bob).await;

        dispatcher
            .send_to_users(&[alice, gone, bob], ServerEvent::Pong)
            .await;

        assert!(alice_rx.try_recv().is_ok());
        assert!(bob_rx.try_recv().is_ok());
    }
}
