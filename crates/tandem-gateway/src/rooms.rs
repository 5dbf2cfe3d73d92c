use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Tracks which users are in which rooms.
///
/// Rooms are created implicitly on first join and never destroyed — they map
/// 1:1 to persistent entities owned elsewhere, so an empty member list is a
/// valid state. Membership order is join order, which is what member lists
/// display.
#[derive(Clone)]
pub struct RoomRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

#[derive(Default)]
struct RegistryInner {
    /// room_id -> members in join order, no duplicates
    rooms: HashMap<String, Vec<Uuid>>,
    /// user_id -> rooms the user is in
    by_user: HashMap<Uuid, HashSet<String>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner::default())),
        }
    }

    /// Add a user to a room. Joining a room the user is already in is a
    /// silent no-op. Returns `true` if membership changed.
    pub async fn join(&self, room_id: &str, user_id: Uuid) -> bool {
        let mut inner = self.inner.write().await;
        let members = inner.rooms.entry(room_id.to_string()).or_default();
        if members.contains(&user_id) {
            return false;
        }
        members.push(user_id);
        inner
            .by_user
            .entry(user_id)
            .or_default()
            .insert(room_id.to_string());
        debug!("{} joined room {}", user_id, room_id);
        true
    }

    /// Remove a user from a room. Leaving a room the user is not in is a
    /// silent no-op. Returns `true` if membership changed.
    pub async fn leave(&self, room_id: &str, user_id: Uuid) -> bool {
        let mut inner = self.inner.write().await;
        let removed = match inner.rooms.get_mut(room_id) {
            Some(members) => match members.iter().position(|m| *m == user_id) {
                Some(pos) => {
                    members.remove(pos);
                    true
                }
                None => false,
            },
            None => false,
        };
        if removed {
            if let Some(rooms) = inner.by_user.get_mut(&user_id) {
                rooms.remove(room_id);
            }
            debug!("{} left room {}", user_id, room_id);
        }
        removed
    }

    /// Remove a user from every room. Used on connection loss — membership
    /// is server-side session state and does not survive a transport drop.
    /// Returns the rooms the user was in.
    pub async fn leave_all(&self, user_id: Uuid) -> Vec<String> {
        let mut inner = self.inner.write().await;
        let rooms: Vec<String> = inner
            .by_user
            .remove(&user_id)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        for room_id in &rooms {
            if let Some(members) = inner.rooms.get_mut(room_id) {
                members.retain(|m| *m != user_id);
            }
        }
        rooms
    }

    /// Current members of a room, ordered by join time.
    pub async fn members(&self, room_id: &str) -> Vec<Uuid> {
        self.inner
            .read()
            .await
            .rooms
            .get(room_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Rooms a user is currently in.
    pub async fn rooms_of(&self, user_id: Uuid) -> Vec<String> {
        self.inner
            .read()
            .await
            .by_user
            .get(&user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn is_member(&self, room_id: &str, user_id: Uuid) -> bool {
        self.inner
            .read()
            .await
            .rooms
            .get(room_id)
            .is_some_and(|members| members.contains(&user_id))
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
