use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use super::SessionId;

/// Push-delivery cache of which sessions joined which channel rooms.
///
/// Channel membership itself lives in storage; this only mirrors it for the
/// sessions that are connected right now.
#[derive(Debug, Clone, Default)]
pub struct RoomTracker {
    state: Arc<RwLock<RoomState>>,
}

#[derive(Debug, Default)]
struct RoomState {
    rooms: HashMap<Uuid, HashSet<SessionId>>,
    joined: HashMap<SessionId, HashSet<Uuid>>,
}

impl RoomState {
    fn remove(&mut self, session_id: SessionId, room_id: Uuid) -> bool {
        let removed = match self.rooms.get_mut(&room_id) {
            Some(sessions) => {
                let removed = sessions.remove(&session_id);
                if sessions.is_empty() {
                    self.rooms.remove(&room_id);
                }
                removed
            }
            None => false,
        };

        if let Some(rooms) = self.joined.get_mut(&session_id) {
            rooms.remove(&room_id);
            if rooms.is_empty() {
                self.joined.remove(&session_id);
            }
        }

        removed
    }
}

impl RoomTracker {
    /// Returns true when the session was not already in the room.
    pub async fn join(&self, session_id: SessionId, room_id: Uuid) -> bool {
        let mut guard = self.state.write().await;
        guard.joined.entry(session_id).or_default().insert(room_id);
        guard.rooms.entry(room_id).or_default().insert(session_id)
    }

    pub async fn leave(&self, session_id: SessionId, room_id: Uuid) -> bool {
        self.state.write().await.remove(session_id, room_id)
    }

    pub async fn members_of(&self, room_id: Uuid) -> Vec<SessionId> {
        self.state
            .read()
            .await
            .rooms
            .get(&room_id)
            .map(|sessions| sessions.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn rooms_of(&self, session_id: SessionId) -> Vec<Uuid> {
        let mut rooms: Vec<Uuid> = self
            .state
            .read()
            .await
            .joined
            .get(&session_id)
            .map(|rooms| rooms.iter().copied().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    pub async fn is_joined(&self, session_id: SessionId, room_id: Uuid) -> bool {
        self.state
            .read()
            .await
            .rooms
            .get(&room_id)
            .is_some_and(|sessions| sessions.contains(&session_id))
    }

    /// Removes the session from every room it joined; returns those rooms.
    pub async fn leave_all(&self, session_id: SessionId) -> Vec<Uuid> {
        let mut guard = self.state.write().await;
        let rooms: Vec<Uuid> =
            guard.joined.remove(&session_id).map(|rooms| rooms.into_iter().collect()).unwrap_or_default();
        for room_id in &rooms {
            if let Some(sessions) = guard.rooms.get_mut(room_id) {
                sessions.remove(&session_id);
                if sessions.is_empty() {
                    guard.rooms.remove(room_id);
                }
            }
        }
        rooms
    }

    /// Forgets the room entirely and returns the sessions that were in it.
    pub async fn drop_room(&self, room_id: Uuid) -> Vec<SessionId> {
        let mut guard = self.state.write().await;
        let sessions: Vec<SessionId> =
            guard.rooms.remove(&room_id).map(|sessions| sessions.into_iter().collect()).unwrap_or_default();
        for session_id in &sessions {
            if let Some(rooms) = guard.joined.get_mut(session_id) {
                rooms.remove(&room_id);
                if rooms.is_empty() {
                    guard.joined.remove(session_id);
                }
            }
        }
        sessions
    }
}
