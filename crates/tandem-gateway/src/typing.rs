use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use tandem_types::events::ServerEvent;

use crate::Gateway;

/// Quiet period after which a typing entry goes stale. Clients emit an
/// explicit stop after the same period; the server-side sweep is the
/// backstop for clients that disconnect mid-type.
pub const TYPING_TTL: Duration = Duration::from_millis(2000);

/// How often the sweeper looks for stale entries.
const SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// Short-lived "user X is typing in room Y" state.
///
/// At most one entry per (room, user); a repeated start re-arms the expiry
/// instead of adding a second entry.
#[derive(Clone)]
pub struct TypingCoordinator {
    entries: Arc<RwLock<HashMap<(String, Uuid), Instant>>>,
}

impl TypingCoordinator {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record (or re-arm) a typing entry.
    pub async fn started(&self, room_id: &str, user_id: Uuid) {
        self.entries
            .write()
            .await
            .insert((room_id.to_string(), user_id), Instant::now());
    }

    /// Remove a typing entry. Returns `true` if one existed.
    pub async fn stopped(&self, room_id: &str, user_id: Uuid) -> bool {
        self.entries
            .write()
            .await
            .remove(&(room_id.to_string(), user_id))
            .is_some()
    }

    /// Drop every entry for a user (connection loss). Returns the rooms the
    /// user was typing in so the caller can broadcast stops.
    pub async fn clear_user(&self, user_id: Uuid) -> Vec<String> {
        let mut entries = self.entries.write().await;
        let rooms: Vec<String> = entries
            .keys()
            .filter(|(_, uid)| *uid == user_id)
            .map(|(room, _)| room.clone())
            .collect();
        for room in &rooms {
            entries.remove(&(room.clone(), user_id));
        }
        rooms
    }

    /// Remove entries older than `ttl` and return them.
    pub async fn sweep(&self, ttl: Duration) -> Vec<(String, Uuid)> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let expired: Vec<(String, Uuid)> = entries
            .iter()
            .filter(|(_, started_at)| now.duration_since(**started_at) >= ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.remove(key);
        }
        expired
    }
}

impl Default for TypingCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Background task broadcasting `user-stopped-typing` for stale entries.
pub(crate) fn spawn_sweeper(gateway: Gateway) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tick.tick().await;
            for (room_id, user_id) in gateway.typing.sweep(TYPING_TTL).await {
                debug!("typing entry for {} in {} expired", user_id, room_id);
                gateway
                    .fan_out(
                        &room_id,
                        ServerEvent::UserStoppedTyping {
                            room_id: room_id.clone(),
                            user_id,
                        },
                        Some(user_id),
                    )
                    .await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn uid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    struct NoopStore;

    impl crate::store::ChatStore for NoopStore {
        fn insert_message(&self, _: &tandem_types::models::ChatMessage) -> anyhow::Result<()> {
            Ok(())
        }

        fn insert_notification(
            &self,
            _: &tandem_types::models::Notification,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        fn upsert_read_receipt(
            &self,
            _: &str,
            _: Uuid,
            _: chrono::DateTime<chrono::Utc>,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        fn upsert_profile(&self, _: Uuid, _: &str, _: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn one_entry_per_room_user_pair() {
        let typing = TypingCoordinator::new();
        typing.started("P1", uid(1)).await;
        typing.started("P1", uid(1)).await; // re-arm, not duplicate
        typing.started("P2", uid(1)).await;

        let mut rooms = typing.clear_user(uid(1)).await;
        rooms.sort();
        assert_eq!(rooms, vec!["P1".to_string(), "P2".to_string()]);
    }

    #[tokio::test]
    async fn explicit_stop_removes_entry() {
        let typing = TypingCoordinator::new();
        typing.started("P1", uid(1)).await;
        assert!(typing.stopped("P1", uid(1)).await);
        assert!(!typing.stopped("P1", uid(1)).await);
    }

    #[tokio::test]
    async fn sweep_expires_only_stale_entries() {
        let typing = TypingCoordinator::new();
        typing.started("P1", uid(1)).await;

        // Fresh entry survives a sweep with the real TTL
        assert!(typing.sweep(TYPING_TTL).await.is_empty());

        // A zero TTL expires everything currently recorded
        let expired = typing.sweep(Duration::ZERO).await;
        assert_eq!(expired, vec![("P1".to_string(), uid(1))]);
        assert!(typing.sweep(Duration::ZERO).await.is_empty());
    }

    #[tokio::test]
    async fn sweeper_broadcasts_stop_after_the_quiet_window() {
        let gateway = Gateway::new(Arc::new(NoopStore), "secret");
        let alice = uid(1);
        let bob = uid(2);
        let (_, mut alice_rx) = gateway.dispatcher.register_user_channel(alice).await;
        let (_, mut bob_rx) = gateway.dispatcher.register_user_channel(bob).await;
        gateway.rooms.join("P1", alice).await;
        gateway.rooms.join("P1", bob).await;

        gateway.typing.started("P1", alice).await;
        let sweeper = gateway.start_typing_sweeper();

        let event = tokio::time::timeout(TYPING_TTL * 2, bob_rx.recv())
            .await
            .expect("quiet window elapsed without a stop event");
        match event {
            Some(ServerEvent::UserStoppedTyping { room_id, user_id }) => {
                assert_eq!(room_id, "P1");
                assert_eq!(user_id, alice);
            }
            other => panic!("expected user-stopped-typing, got {other:?}"),
        }

        // The typer themselves is excluded from the broadcast
        assert!(alice_rx.try_recv().is_err());
        sweeper.abort();
    }
}
