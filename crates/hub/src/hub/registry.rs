use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chatline_common::protocol::events::ServerEvent;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::SessionId;

/// Live sessions keyed by the user they speak for.
///
/// A user may hold several sessions at once (one per device or tab); each
/// session is bound to exactly one user for its whole life.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    state: Arc<RwLock<RegistryState>>,
}

#[derive(Debug, Default)]
struct RegistryState {
    by_user: HashMap<Uuid, HashSet<SessionId>>,
    sessions: HashMap<SessionId, SessionEntry>,
}

#[derive(Debug)]
struct SessionEntry {
    user_id: Uuid,
    outbound: mpsc::UnboundedSender<ServerEvent>,
}

/// Outcome of pushing one event to a set of sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    /// Targets that vanished or whose outbound queue was already closed.
    pub dropped: usize,
}

impl DeliveryReport {
    pub fn absorb(&mut self, other: DeliveryReport) {
        self.delivered += other.delivered;
        self.dropped += other.dropped;
    }
}

impl SessionRegistry {
    pub async fn bind(
        &self,
        user_id: Uuid,
        session_id: SessionId,
        outbound: mpsc::UnboundedSender<ServerEvent>,
    ) {
        let mut guard = self.state.write().await;
        if let Some(previous) = guard.sessions.insert(session_id, SessionEntry { user_id, outbound })
        {
            if previous.user_id != user_id {
                remove_from_user(&mut guard.by_user, previous.user_id, session_id);
            }
        }
        guard.by_user.entry(user_id).or_default().insert(session_id);
    }

    /// Removes the session and returns the user it belonged to. Unknown
    /// sessions yield `None`, so repeated calls are harmless.
    pub async fn unbind(&self, session_id: SessionId) -> Option<Uuid> {
        let mut guard = self.state.write().await;
        let entry = guard.sessions.remove(&session_id)?;
        remove_from_user(&mut guard.by_user, entry.user_id, session_id);
        Some(entry.user_id)
    }

    pub async fn sessions_for(&self, user_id: Uuid) -> Vec<SessionId> {
        self.state
            .read()
            .await
            .by_user
            .get(&user_id)
            .map(|sessions| sessions.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn user_for(&self, session_id: SessionId) -> Option<Uuid> {
        self.state.read().await.sessions.get(&session_id).map(|entry| entry.user_id)
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.state.read().await.by_user.contains_key(&user_id)
    }

    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    /// Pushes `event` to every listed session once. Senders are cloned under
    /// the read lock and used after it is released.
    pub async fn deliver<I>(&self, sessions: I, event: &ServerEvent) -> DeliveryReport
    where
        I: IntoIterator<Item = SessionId>,
    {
        let unique: HashSet<SessionId> = sessions.into_iter().collect();
        let mut report = DeliveryReport::default();
        let mut recipients = Vec::with_capacity(unique.len());
        {
            let guard = self.state.read().await;
            for session_id in unique {
                match guard.sessions.get(&session_id) {
                    Some(entry) => recipients.push((session_id, entry.outbound.clone())),
                    None => {
                        tracing::debug!(
                            session_id = %session_id,
                            event = event.name(),
                            "delivery target no longer connected"
                        );
                        report.dropped += 1;
                    }
                }
            }
        }

        for (session_id, outbound) in recipients {
            if outbound.send(event.clone()).is_ok() {
                report.delivered += 1;
            } else {
                tracing::warn!(
                    session_id = %session_id,
                    event = event.name(),
                    "outbound queue closed; dropping event"
                );
                report.dropped += 1;
            }
        }

        report
    }
}

fn remove_from_user(
    by_user: &mut HashMap<Uuid, HashSet<SessionId>>,
    user_id: Uuid,
    session_id: SessionId,
) {
    if let Some(sessions) = by_user.get_mut(&user_id) {
        sessions.remove(&session_id);
        if sessions.is_empty() {
            by_user.remove(&user_id);
        }
    }
}
