// Presence & fan-out core.
//
// `Hub` is a cheap clonable handle over the shared registries. Each live
// connection task calls into it; no lock is ever held across two registries.

pub mod callbacks;
pub mod fanout;
pub mod receipts;
pub mod registry;
pub mod rooms;
pub mod typing;

use chatline_common::protocol::events::{ClientEvent, ServerEvent};
use chatline_common::types::UserSummary;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::HubError;
use crate::store::ChatStore;

pub use fanout::MessageAudience;
pub use registry::{DeliveryReport, SessionRegistry};
pub use rooms::RoomTracker;
pub use typing::TypingCoordinator;

pub type SessionId = Uuid;

/// Reserved identity of the AI assistant participant.
pub const ASSISTANT_USER_ID: Uuid = Uuid::from_u128(0x6368_6174_7465_4000_8000_0000_0000_0001);

pub fn assistant_summary() -> UserSummary {
    UserSummary {
        id: ASSISTANT_USER_ID,
        email: String::new(),
        first_name: Some("ChatterBot".into()),
        last_name: Some("(AI)".into()),
        image: Some("/chatbot-avatar.png".into()),
        color: Some(4),
    }
}

/// Identity of one established connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectedSession {
    pub session_id: SessionId,
    pub user_id: Uuid,
}

#[derive(Clone)]
pub struct Hub {
    store: ChatStore,
    registry: SessionRegistry,
    rooms: RoomTracker,
    typing: TypingCoordinator,
}

impl Hub {
    pub fn new(store: ChatStore) -> Self {
        Self {
            store,
            registry: SessionRegistry::default(),
            rooms: RoomTracker::default(),
            typing: TypingCoordinator::default(),
        }
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomTracker {
        &self.rooms
    }

    /// Binds a new session for an already-authenticated user and joins it to
    /// the rooms of every channel the user belongs to.
    pub async fn connect(
        &self,
        user_id: Uuid,
        outbound: mpsc::UnboundedSender<ServerEvent>,
    ) -> ConnectedSession {
        let session_id = Uuid::new_v4();
        self.registry.bind(user_id, session_id, outbound).await;

        match self.store.find_channels_for_user(user_id).await {
            Ok(channels) => {
                for channel in &channels {
                    self.rooms.join(session_id, channel.id).await;
                }
                tracing::info!(
                    session_id = %session_id,
                    user_id = %user_id,
                    rooms = channels.len(),
                    "session connected"
                );
            }
            Err(error) => {
                tracing::error!(
                    session_id = %session_id,
                    user_id = %user_id,
                    error = ?error,
                    "failed to seed rooms; continuing with an empty room cache"
                );
            }
        }

        ConnectedSession { session_id, user_id }
    }

    /// Tears the session down. Safe to call more than once.
    pub async fn disconnect(&self, session_id: SessionId) {
        let user_id = self.registry.unbind(session_id).await;
        let rooms = self.rooms.leave_all(session_id).await;
        let abandoned = self.typing.clear_session(session_id).await;

        for (typist, conversation) in abandoned {
            self.broadcast_stop_typing(typist, conversation).await;
        }

        match user_id {
            Some(user_id) => tracing::info!(
                session_id = %session_id,
                user_id = %user_id,
                rooms = rooms.len(),
                "session disconnected"
            ),
            None => tracing::debug!(session_id = %session_id, "disconnect for unknown session"),
        }
    }

    /// Joins a session that was looked up in the registry a moment ago.
    ///
    /// `disconnect` unbinds before it leaves rooms, so re-checking the binding
    /// after the join catches a session that went away in between.
    async fn join_live(&self, session_id: SessionId, room_id: Uuid) -> bool {
        let joined = self.rooms.join(session_id, room_id).await;
        if self.registry.user_for(session_id).await.is_none() {
            self.rooms.leave(session_id, room_id).await;
            return false;
        }
        joined
    }

    /// Routes one inbound event to its handler.
    pub async fn dispatch(
        &self,
        session: ConnectedSession,
        event: ClientEvent,
    ) -> Result<DeliveryReport, HubError> {
        match event {
            ClientEvent::SendMessage(payload) => {
                ensure_self(session, payload.sender, "sender")?;
                let body = payload.body()?;
                self.send_direct(session.user_id, payload.recipient, body).await
            }
            ClientEvent::SendChannelMessage(payload) => {
                ensure_self(session, payload.sender, "sender")?;
                let body = payload.body()?;
                self.send_channel(payload.channel_id, session.user_id, body).await
            }
            ClientEvent::Typing(payload) => {
                Ok(self.typing_started(session, payload.conversation()?).await)
            }
            ClientEvent::StopTyping(payload) => {
                Ok(self.typing_stopped(session, payload.conversation()?).await)
            }
            ClientEvent::MarkAsRead(payload) => {
                ensure_self(session, payload.user_id, "userId")?;
                self.mark_read(session.user_id, payload.conversation()).await
            }
        }
    }
}

fn ensure_self(session: ConnectedSession, claimed: Uuid, field: &'static str) -> Result<(), HubError> {
    if claimed == session.user_id {
        Ok(())
    } else {
        Err(HubError::Forbidden(format!("`{field}` must be the connected user")))
    }
}
