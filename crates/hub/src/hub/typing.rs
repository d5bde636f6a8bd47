use std::collections::HashMap;
use std::sync::Arc;

use chatline_common::protocol::events::{ServerEvent, TypingNotice};
use chatline_common::types::Conversation;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ConnectedSession, DeliveryReport, Hub, SessionId};

/// Who is typing where. A (user, conversation) pair is either absent (idle)
/// or mapped to the session that started typing.
#[derive(Debug, Clone, Default)]
pub struct TypingCoordinator {
    state: Arc<RwLock<HashMap<(Uuid, Conversation), SessionId>>>,
}

impl TypingCoordinator {
    /// Returns true on an idle to typing transition. A repeat from another
    /// session of the same user hands ownership to that session.
    pub async fn start(&self, user_id: Uuid, conversation: Conversation, session_id: SessionId) -> bool {
        self.state.write().await.insert((user_id, conversation), session_id).is_none()
    }

    /// Returns true on a typing to idle transition.
    pub async fn stop(&self, user_id: Uuid, conversation: Conversation) -> bool {
        self.state.write().await.remove(&(user_id, conversation)).is_some()
    }

    pub async fn is_typing(&self, user_id: Uuid, conversation: Conversation) -> bool {
        self.state.read().await.contains_key(&(user_id, conversation))
    }

    /// Drops every entry owned by the session and returns the conversations
    /// it was typing in.
    pub async fn clear_session(&self, session_id: SessionId) -> Vec<(Uuid, Conversation)> {
        let mut guard = self.state.write().await;
        let owned: Vec<(Uuid, Conversation)> =
            guard.iter().filter(|(_, owner)| **owner == session_id).map(|(key, _)| *key).collect();
        for key in &owned {
            guard.remove(key);
        }
        owned
    }

    pub async fn clear_conversation(&self, conversation: Conversation) {
        self.state.write().await.retain(|(_, typed_in), _| *typed_in != conversation);
    }
}

impl Hub {
    pub async fn typing_started(
        &self,
        session: ConnectedSession,
        conversation: Conversation,
    ) -> DeliveryReport {
        if !self.may_signal(session, conversation).await {
            return DeliveryReport::default();
        }
        if !self.typing.start(session.user_id, conversation, session.session_id).await {
            return DeliveryReport::default();
        }

        let sender_name = match self.store.user_summary(session.user_id).await {
            Ok(summary) => summary.map(|summary| summary.display_name()),
            Err(error) => {
                tracing::warn!(
                    user_id = %session.user_id,
                    error = ?error,
                    "typing display name lookup failed"
                );
                None
            }
        };

        let notice = TypingNotice::new(session.user_id, conversation, sender_name);
        self.route_typing(session.user_id, conversation, ServerEvent::Typing(notice)).await
    }

    pub async fn typing_stopped(
        &self,
        session: ConnectedSession,
        conversation: Conversation,
    ) -> DeliveryReport {
        if !self.typing.stop(session.user_id, conversation).await {
            return DeliveryReport::default();
        }

        self.broadcast_stop_typing(session.user_id, conversation).await
    }

    pub(super) async fn broadcast_stop_typing(
        &self,
        user_id: Uuid,
        conversation: Conversation,
    ) -> DeliveryReport {
        let notice = TypingNotice::new(user_id, conversation, None);
        self.route_typing(user_id, conversation, ServerEvent::StopTyping(notice)).await
    }

    /// Channel signals need the sending session in the room; direct signals
    /// to oneself are ignored.
    async fn may_signal(&self, session: ConnectedSession, conversation: Conversation) -> bool {
        match conversation {
            Conversation::Direct(recipient) => recipient != session.user_id,
            Conversation::Channel(channel_id) => {
                let joined = self.rooms.is_joined(session.session_id, channel_id).await;
                if !joined {
                    tracing::debug!(
                        session_id = %session.session_id,
                        channel_id = %channel_id,
                        "ignoring typing signal for a room the session has not joined"
                    );
                }
                joined
            }
        }
    }

    async fn route_typing(
        &self,
        sender: Uuid,
        conversation: Conversation,
        event: ServerEvent,
    ) -> DeliveryReport {
        let targets = match conversation {
            Conversation::Direct(recipient) => self.registry.sessions_for(recipient).await,
            Conversation::Channel(channel_id) => {
                let own = self.registry.sessions_for(sender).await;
                self.rooms
                    .members_of(channel_id)
                    .await
                    .into_iter()
                    .filter(|session_id| !own.contains(session_id))
                    .collect()
            }
        };

        self.registry.deliver(targets, &event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn only_transitions_are_reported() {
        let typing = TypingCoordinator::default();
        let user = Uuid::new_v4();
        let conversation = Conversation::Direct(Uuid::new_v4());
        let session = Uuid::new_v4();

        assert!(typing.start(user, conversation, session).await);
        assert!(!typing.start(user, conversation, session).await);
        assert!(typing.is_typing(user, conversation).await);
        assert!(typing.stop(user, conversation).await);
        assert!(!typing.stop(user, conversation).await);
    }

    #[tokio::test]
    async fn clear_session_returns_owned_conversations_only() {
        let typing = TypingCoordinator::default();
        let user = Uuid::new_v4();
        let (phone, laptop) = (Uuid::new_v4(), Uuid::new_v4());
        let direct = Conversation::Direct(Uuid::new_v4());
        let channel = Conversation::Channel(Uuid::new_v4());
        typing.start(user, direct, phone).await;
        typing.start(user, channel, laptop).await;

        assert_eq!(typing.clear_session(phone).await, vec![(user, direct)]);
        assert!(!typing.is_typing(user, direct).await);
        assert!(typing.is_typing(user, channel).await);
    }

    #[tokio::test]
    async fn latest_typing_session_owns_the_state() {
        let typing = TypingCoordinator::default();
        let user = Uuid::new_v4();
        let (phone, laptop) = (Uuid::new_v4(), Uuid::new_v4());
        let channel = Conversation::Channel(Uuid::new_v4());

        assert!(typing.start(user, channel, phone).await);
        assert!(!typing.start(user, channel, laptop).await);

        assert!(typing.clear_session(phone).await.is_empty());
        assert!(typing.is_typing(user, channel).await);
        assert_eq!(typing.clear_session(laptop).await, vec![(user, channel)]);
    }

    #[tokio::test]
    async fn clear_conversation_resets_all_typists() {
        let typing = TypingCoordinator::default();
        let channel = Conversation::Channel(Uuid::new_v4());
        let (ada, bob) = (Uuid::new_v4(), Uuid::new_v4());
        typing.start(ada, channel, Uuid::new_v4()).await;
        typing.start(bob, channel, Uuid::new_v4()).await;

        typing.clear_conversation(channel).await;

        assert!(!typing.is_typing(ada, channel).await);
        assert!(!typing.is_typing(bob, channel).await);
    }
}
