use std::collections::HashSet;

use chatline_common::protocol::events::{MessageBody, ServerEvent, ValidationError};
use chatline_common::types::{MessageType, MessageView, UserSummary};
use chrono::Utc;
use uuid::Uuid;

use super::{assistant_summary, DeliveryReport, Hub, SessionId, ASSISTANT_USER_ID};
use crate::error::HubError;
use crate::store::{ChannelRecord, MessageRecord, NewMessage};

/// Who should see an event about a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageAudience {
    Channel(Uuid),
    Direct { sender: Uuid, recipient: Uuid },
}

impl MessageAudience {
    pub fn of(record: &MessageRecord) -> Option<Self> {
        match (record.channel_id, record.recipient_id) {
            (Some(channel_id), _) => Some(Self::Channel(channel_id)),
            (None, Some(recipient)) => Some(Self::Direct { sender: record.sender_id, recipient }),
            (None, None) => None,
        }
    }

    pub const fn channel_id(self) -> Option<Uuid> {
        match self {
            Self::Channel(channel_id) => Some(channel_id),
            Self::Direct { .. } => None,
        }
    }
}

impl Hub {
    /// Persists a direct message, then pushes it to every live session of
    /// both parties.
    pub async fn send_direct(
        &self,
        sender: Uuid,
        recipient: Uuid,
        body: MessageBody,
    ) -> Result<DeliveryReport, HubError> {
        if recipient == ASSISTANT_USER_ID {
            return Err(HubError::Forbidden(
                "assistant conversations go through the assistant service".into(),
            ));
        }

        let record = self.store.create_message(NewMessage::direct(sender, recipient, body)).await?;
        let message_id = record.id;
        let view = self.populate_one(record).await?;

        let targets = self.direct_targets(sender, recipient).await;
        let report = self.registry.deliver(targets, &ServerEvent::ReceiveMessage(view)).await;
        tracing::debug!(
            message_id = %message_id,
            sender = %sender,
            recipient = %recipient,
            delivered = report.delivered,
            "direct message fanned out"
        );

        Ok(report)
    }

    /// Persists a channel message, appends it to the channel, then pushes it
    /// once to every live session of every member and the admin.
    pub async fn send_channel(
        &self,
        channel_id: Uuid,
        sender: Uuid,
        body: MessageBody,
    ) -> Result<DeliveryReport, HubError> {
        let channel = self
            .store
            .find_channel_by_id(channel_id)
            .await?
            .ok_or(HubError::NotFound("channel"))?;
        if !channel.includes(sender) {
            return Err(HubError::Forbidden("sender is not a member of this channel".into()));
        }

        let record = self.store.create_message(NewMessage::channel(sender, channel_id, body)).await?;
        self.store.append_channel_message(channel_id, record.id).await?;
        let message_id = record.id;
        let view = self.populate_one(record).await?;

        let targets = self.channel_targets(&channel).await;
        let report =
            self.registry.deliver(targets, &ServerEvent::ReceiveChannelMessage(view)).await;
        tracing::debug!(
            message_id = %message_id,
            channel_id = %channel_id,
            channel = %channel.name,
            sender = %sender,
            delivered = report.delivered,
            "channel message fanned out"
        );

        Ok(report)
    }

    /// Pushes an assistant reply to the user's live sessions without
    /// persisting it.
    pub async fn deliver_assistant_reply(
        &self,
        user_id: Uuid,
        content: &str,
    ) -> Result<DeliveryReport, HubError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ValidationError::BlankContent.into());
        }

        let recipient =
            self.store.user_summary(user_id).await?.unwrap_or_else(|| UserSummary::unknown(user_id));
        let view = MessageView {
            id: Uuid::new_v4(),
            sender: assistant_summary(),
            recipient: Some(recipient),
            channel_id: None,
            content: Some(content.to_string()),
            message_type: MessageType::Text,
            file_url: None,
            timestamp: Utc::now(),
            read_by: Vec::new(),
        };

        let sessions = self.registry.sessions_for(user_id).await;
        Ok(self.registry.deliver(sessions, &ServerEvent::ReceiveMessage(view)).await)
    }

    pub(super) async fn populate_one(&self, record: MessageRecord) -> Result<MessageView, HubError> {
        self.store
            .populate(vec![record])
            .await?
            .pop()
            .ok_or(HubError::NotFound("message"))
    }

    pub(super) async fn direct_targets(&self, sender: Uuid, recipient: Uuid) -> HashSet<SessionId> {
        let mut targets: HashSet<SessionId> =
            self.registry.sessions_for(sender).await.into_iter().collect();
        targets.extend(self.registry.sessions_for(recipient).await);
        targets
    }

    /// Live sessions of the channel's members and admin, each once.
    ///
    /// The room cache is reconciled on the way: live participant sessions
    /// missing from it are joined, and cached sessions whose user is no
    /// longer a participant are evicted.
    pub(super) async fn channel_targets(&self, channel: &ChannelRecord) -> HashSet<SessionId> {
        let cached: HashSet<SessionId> = self.rooms.members_of(channel.id).await.into_iter().collect();

        let mut targets = HashSet::new();
        for user_id in channel.participants() {
            for session_id in self.registry.sessions_for(user_id).await {
                if !cached.contains(&session_id) {
                    tracing::debug!(
                        session_id = %session_id,
                        channel_id = %channel.id,
                        "joining live member session missing from room cache"
                    );
                    self.join_live(session_id, channel.id).await;
                }
                targets.insert(session_id);
            }
        }

        for stale in cached.difference(&targets) {
            tracing::debug!(
                session_id = %stale,
                channel_id = %channel.id,
                "evicting session of a non-member from room cache"
            );
            self.rooms.leave(*stale, channel.id).await;
        }

        targets
    }

    pub(super) async fn audience_targets(
        &self,
        audience: MessageAudience,
    ) -> Result<HashSet<SessionId>, HubError> {
        match audience {
            MessageAudience::Direct { sender, recipient } => {
                Ok(self.direct_targets(sender, recipient).await)
            }
            MessageAudience::Channel(channel_id) => {
                let channel = self
                    .store
                    .find_channel_by_id(channel_id)
                    .await?
                    .ok_or(HubError::NotFound("channel"))?;
                Ok(self.channel_targets(&channel).await)
            }
        }
    }
}
