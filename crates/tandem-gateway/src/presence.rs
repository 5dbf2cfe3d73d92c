use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

/// Derived online/offline state, one boolean per user.
///
/// A user is online while they have a live connection. The single-connection
/// policy lives in the dispatcher (a new connection for the same user
/// supersedes the old channel), so this map never needs reference counting.
#[derive(Clone)]
pub struct PresenceTracker {
    online: Arc<RwLock<HashMap<Uuid, String>>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self {
            online: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Mark a user online. Returns `true` if they were offline before.
    pub async fn set_online(&self, user_id: Uuid, username: String) -> bool {
        self.online.write().await.insert(user_id, username).is_none()
    }

    /// Mark a user offline. Returns `true` if they were online before.
    pub async fn set_offline(&self, user_id: Uuid) -> bool {
        self.online.write().await.remove(&user_id).is_some()
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.online.read().await.contains_key(&user_id)
    }

    /// Everyone currently online. Sent to each client right after connect so
    /// presence converges without polling.
    pub async fn snapshot(&self) -> Vec<(Uuid, String)> {
        self.online
            .read()
            .await
            .iter()
            .map(|(id, name)| (*id, name.clone()))
            .collect()
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn online_state_follows_connection_lifecycle() {
        let presence = PresenceTracker::new();
        let alice = Uuid::from_u128(1);

        assert!(!presence.is_online(alice).await);
        assert!(presence.set_online(alice, "Alice".into()).await);
        // Second connect event for the same user is not "newly online"
        assert!(!presence.set_online(alice, "Alice".into()).await);
        assert!(presence.is_online(alice).await);

        assert!(presence.set_offline(alice).await);
        assert!(!presence.set_offline(alice).await);
        assert!(!presence.is_online(alice).await);
    }

    #[tokio::test]
    async fn snapshot_lists_current_users() {
        let presence = PresenceTracker::new();
        presence.set_online(Uuid::from_u128(1), "Alice".into()).await;
        presence.set_online(Uuid::from_u128(2), "Bob".into()).await;
        presence.set_offline(Uuid::from_u128(2)).await;

        let snapshot = presence.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].1, "Alice");
    }
}
