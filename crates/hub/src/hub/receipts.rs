use chatline_common::protocol::events::{MessagesRead, ServerEvent};
use chatline_common::types::{Conversation, MessageView};
use uuid::Uuid;

use super::{DeliveryReport, Hub, ASSISTANT_USER_ID};
use crate::error::HubError;
use crate::store::MessageQuery;

impl Hub {
    /// Marks every message of the conversation the reader has not seen yet as
    /// read and tells both sides.
    ///
    /// Direct notifications are addressed relative to the receiving party: the
    /// reader gets `chatId = other`, the other party gets `chatId = reader`.
    pub async fn mark_read(
        &self,
        reader: Uuid,
        conversation: Conversation,
    ) -> Result<DeliveryReport, HubError> {
        if conversation.id() == ASSISTANT_USER_ID {
            return Ok(DeliveryReport::default());
        }

        let (query, channel) = match conversation {
            Conversation::Channel(channel_id) => {
                let channel = self
                    .store
                    .find_channel_by_id(channel_id)
                    .await?
                    .ok_or(HubError::NotFound("channel"))?;
                if !channel.includes(reader) {
                    return Err(HubError::Forbidden("reader is not a member of this channel".into()));
                }
                (MessageQuery::ids(channel.message_ids.clone()).unread_by(reader), Some(channel))
            }
            Conversation::Direct(other) => {
                (MessageQuery::direct_between(reader, other).unread_by(reader), None)
            }
        };

        let unread = self.store.find_messages(&query).await?;
        if unread.is_empty() {
            return Ok(DeliveryReport::default());
        }

        let ids: Vec<Uuid> = unread.iter().map(|message| message.id).collect();
        let changed = self.store.add_message_reader(&ids, reader).await?;
        let messages = self.store.populate(self.store.find_messages_by_ids(&ids).await?).await?;
        tracing::debug!(
            reader = %reader,
            conversation = %conversation.id(),
            changed,
            "messages marked read"
        );

        let report = match channel {
            Some(channel) => {
                let targets = self.channel_targets(&channel).await;
                let event =
                    ServerEvent::MessagesRead(MessagesRead { chat_id: channel.id, messages });
                self.registry.deliver(targets, &event).await
            }
            None => self.notify_direct_read(reader, conversation.id(), messages).await,
        };

        Ok(report)
    }

    async fn notify_direct_read(
        &self,
        reader: Uuid,
        other: Uuid,
        messages: Vec<MessageView>,
    ) -> DeliveryReport {
        let to_reader = MessagesRead { chat_id: other, messages: messages.clone() };
        let mut report = self
            .registry
            .deliver(self.registry.sessions_for(reader).await, &ServerEvent::MessagesRead(to_reader))
            .await;

        if other != reader {
            let to_other = MessagesRead { chat_id: reader, messages };
            report.absorb(
                self.registry
                    .deliver(
                        self.registry.sessions_for(other).await,
                        &ServerEvent::MessagesRead(to_other),
                    )
                    .await,
            );
        }

        report
    }
}
