// Entry points for the CRUD side of the system: channel and message changes
// made elsewhere that connected clients must hear about.

use chatline_common::protocol::events::{ChannelRef, MessageDeleted, MessageEdited, ServerEvent};
use chatline_common::types::Conversation;
use uuid::Uuid;

use super::fanout::MessageAudience;
use super::{DeliveryReport, Hub};
use crate::error::HubError;

impl Hub {
    /// Notifies everyone in the room, then forgets the room.
    pub async fn channel_deleted(&self, channel_id: Uuid) -> DeliveryReport {
        let sessions = self.rooms.drop_room(channel_id).await;
        self.typing.clear_conversation(Conversation::Channel(channel_id)).await;

        let event = ServerEvent::ChannelDeleted(ChannelRef { channel_id });
        let report = self.registry.deliver(sessions, &event).await;
        tracing::info!(channel_id = %channel_id, delivered = report.delivered, "channel deleted");
        report
    }

    pub async fn member_removed(&self, channel_id: Uuid, user_id: Uuid) -> DeliveryReport {
        let sessions = self.detach_member(channel_id, user_id).await;
        let event = ServerEvent::RemovedFromChannel(ChannelRef { channel_id });
        self.registry.deliver(sessions, &event).await
    }

    pub async fn member_left(&self, channel_id: Uuid, user_id: Uuid) {
        self.detach_member(channel_id, user_id).await;
    }

    pub async fn member_added(&self, channel_id: Uuid, user_id: Uuid) -> usize {
        let mut joined = 0;
        for session_id in self.registry.sessions_for(user_id).await {
            if self.join_live(session_id, channel_id).await {
                joined += 1;
            }
        }
        joined
    }

    pub async fn message_edited(
        &self,
        message_id: Uuid,
        new_content: String,
    ) -> Result<DeliveryReport, HubError> {
        let record = self
            .store
            .find_messages_by_ids(&[message_id])
            .await?
            .pop()
            .ok_or(HubError::NotFound("message"))?;
        let audience = MessageAudience::of(&record).ok_or(HubError::NotFound("message audience"))?;

        let targets = self.audience_targets(audience).await?;
        let event = ServerEvent::MessageEdited(MessageEdited {
            message_id,
            new_content,
            channel_id: audience.channel_id(),
        });
        Ok(self.registry.deliver(targets, &event).await)
    }

    /// The message is already gone from storage, so the caller says who saw it.
    pub async fn message_deleted(
        &self,
        message_id: Uuid,
        audience: MessageAudience,
    ) -> Result<DeliveryReport, HubError> {
        let targets = self.audience_targets(audience).await?;
        let event = ServerEvent::MessageDeleted(MessageDeleted {
            message_id,
            channel_id: audience.channel_id(),
        });
        Ok(self.registry.deliver(targets, &event).await)
    }

    async fn detach_member(&self, channel_id: Uuid, user_id: Uuid) -> Vec<super::SessionId> {
        let sessions = self.registry.sessions_for(user_id).await;
        for session_id in &sessions {
            self.rooms.leave(*session_id, channel_id).await;
        }
        if self.typing.stop(user_id, Conversation::Channel(channel_id)).await {
            self.broadcast_stop_typing(user_id, Conversation::Channel(channel_id)).await;
        }
        tracing::debug!(
            channel_id = %channel_id,
            user_id = %user_id,
            sessions = sessions.len(),
            "member detached from room"
        );
        sessions
    }
}
