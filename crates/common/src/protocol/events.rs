// Realtime event frames exchanged over the chatline WebSocket.
//
// Every frame is `{"event": "<name>", "data": {...}}`. Event names follow the
// names the web client already listens for, so they are not uniformly cased.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::types::{Conversation, MessageType, MessageView};

/// Events a client may send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "sendMessage")]
    SendMessage(DirectMessagePayload),
    #[serde(rename = "sendChannelMessage")]
    SendChannelMessage(ChannelMessagePayload),
    #[serde(rename = "typing")]
    Typing(TypingPayload),
    #[serde(rename = "stop-typing")]
    StopTyping(TypingPayload),
    #[serde(rename = "mark-as-read")]
    MarkAsRead(MarkAsReadPayload),
}

impl ClientEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SendMessage(_) => "sendMessage",
            Self::SendChannelMessage(_) => "sendChannelMessage",
            Self::Typing(_) => "typing",
            Self::StopTyping(_) => "stop-typing",
            Self::MarkAsRead(_) => "mark-as-read",
        }
    }
}

/// Events the hub pushes to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "receiveMessage")]
    ReceiveMessage(MessageView),
    #[serde(rename = "receive-channel-message")]
    ReceiveChannelMessage(MessageView),
    #[serde(rename = "typing")]
    Typing(TypingNotice),
    #[serde(rename = "stop-typing")]
    StopTyping(TypingNotice),
    #[serde(rename = "messages-read")]
    MessagesRead(MessagesRead),
    #[serde(rename = "channel-deleted")]
    ChannelDeleted(ChannelRef),
    #[serde(rename = "removed-from-channel")]
    RemovedFromChannel(ChannelRef),
    #[serde(rename = "message-deleted")]
    MessageDeleted(MessageDeleted),
    #[serde(rename = "message-edited")]
    MessageEdited(MessageEdited),
    #[serde(rename = "error")]
    Error(ErrorNotice),
}

impl ServerEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ReceiveMessage(_) => "receiveMessage",
            Self::ReceiveChannelMessage(_) => "receive-channel-message",
            Self::Typing(_) => "typing",
            Self::StopTyping(_) => "stop-typing",
            Self::MessagesRead(_) => "messages-read",
            Self::ChannelDeleted(_) => "channel-deleted",
            Self::RemovedFromChannel(_) => "removed-from-channel",
            Self::MessageDeleted(_) => "message-deleted",
            Self::MessageEdited(_) => "message-edited",
            Self::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("text messages require non-empty content")]
    BlankContent,
    #[error("file messages require a fileUrl")]
    MissingFileUrl,
}

/// A validated message body, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBody {
    pub content: Option<String>,
    pub message_type: MessageType,
    pub file_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessagePayload {
    pub sender: Uuid,
    pub recipient: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

impl DirectMessagePayload {
    pub fn body(&self) -> Result<MessageBody, ValidationError> {
        validate_body(self.content.as_deref(), self.message_type, self.file_url.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMessagePayload {
    pub channel_id: Uuid,
    pub sender: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

impl ChannelMessagePayload {
    pub fn body(&self) -> Result<MessageBody, ValidationError> {
        validate_body(self.content.as_deref(), self.message_type, self.file_url.as_deref())
    }
}

fn validate_body(
    content: Option<&str>,
    message_type: MessageType,
    file_url: Option<&str>,
) -> Result<MessageBody, ValidationError> {
    let content = content.filter(|value| !value.trim().is_empty()).map(ToOwned::to_owned);
    let file_url = file_url.filter(|value| !value.trim().is_empty()).map(ToOwned::to_owned);

    match message_type {
        MessageType::Text if content.is_none() => Err(ValidationError::BlankContent),
        MessageType::File if file_url.is_none() => Err(ValidationError::MissingFileUrl),
        _ => Ok(MessageBody { content, message_type, file_url }),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<Uuid>,
    #[serde(default)]
    pub is_channel: bool,
}

impl TypingPayload {
    pub fn conversation(&self) -> Result<Conversation, ValidationError> {
        if self.is_channel {
            self.channel_id.map(Conversation::Channel).ok_or(ValidationError::MissingField("channelId"))
        } else {
            self.recipient.map(Conversation::Direct).ok_or(ValidationError::MissingField("recipient"))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MarkAsReadPayload {
    pub user_id: Uuid,
    pub chat_id: Uuid,
    #[serde(default)]
    pub is_channel: bool,
}

impl MarkAsReadPayload {
    pub fn conversation(&self) -> Conversation {
        if self.is_channel {
            Conversation::Channel(self.chat_id)
        } else {
            Conversation::Direct(self.chat_id)
        }
    }
}

/// Typing start/stop as delivered to other participants.
///
/// `sender_name` is only attached to start notifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingNotice {
    pub sender: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<Uuid>,
    pub is_channel: bool,
}

impl TypingNotice {
    pub fn new(sender: Uuid, conversation: Conversation, sender_name: Option<String>) -> Self {
        let (recipient, channel_id) = match conversation {
            Conversation::Direct(recipient) => (Some(recipient), None),
            Conversation::Channel(channel_id) => (None, Some(channel_id)),
        };

        Self { sender, sender_name, recipient, channel_id, is_channel: conversation.is_channel() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessagesRead {
    pub chat_id: Uuid,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRef {
    pub channel_id: Uuid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeleted {
    pub message_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageEdited {
    pub message_id: Uuid,
    pub new_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorNotice {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_send_message_frame() {
        let sender = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let raw = json!({
            "event": "sendMessage",
            "data": {
                "sender": sender,
                "recipient": recipient,
                "content": "hello",
                "messageType": "text"
            }
        });

        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        match event {
            ClientEvent::SendMessage(payload) => {
                assert_eq!(payload.sender, sender);
                assert_eq!(payload.recipient, recipient);
                assert_eq!(payload.content.as_deref(), Some("hello"));
                assert!(payload.file_url.is_none());
            }
            other => panic!("expected sendMessage, got {other:?}"),
        }
    }

    #[test]
    fn decodes_hyphenated_event_names() {
        let chat_id = Uuid::new_v4();
        let raw = json!({
            "event": "mark-as-read",
            "data": { "userId": Uuid::new_v4(), "chatId": chat_id, "isChannel": true }
        });

        let event: ClientEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.name(), "mark-as-read");
        let ClientEvent::MarkAsRead(payload) = event else { panic!("expected mark-as-read") };
        assert_eq!(payload.conversation(), Conversation::Channel(chat_id));
    }

    #[test]
    fn rejects_unknown_event_names() {
        let raw = json!({ "event": "sendmessage", "data": {} });
        assert!(serde_json::from_value::<ClientEvent>(raw).is_err());
    }

    #[test]
    fn text_message_requires_content() {
        let payload = DirectMessagePayload {
            sender: Uuid::new_v4(),
            recipient: Uuid::new_v4(),
            content: Some("   ".into()),
            message_type: MessageType::Text,
            file_url: None,
        };
        assert_eq!(payload.body(), Err(ValidationError::BlankContent));
    }

    #[test]
    fn file_message_requires_url_but_not_content() {
        let mut payload = ChannelMessagePayload {
            channel_id: Uuid::new_v4(),
            sender: Uuid::new_v4(),
            content: None,
            message_type: MessageType::File,
            file_url: None,
        };
        assert_eq!(payload.body(), Err(ValidationError::MissingFileUrl));

        payload.file_url = Some("https://files.example.test/a.png".into());
        let body = payload.body().unwrap();
        assert_eq!(body.message_type, MessageType::File);
        assert!(body.content.is_none());
    }

    #[test]
    fn typing_payload_requires_matching_target() {
        let channel_id = Uuid::new_v4();
        let channel_without_id =
            TypingPayload { recipient: Some(Uuid::new_v4()), channel_id: None, is_channel: true };
        assert_eq!(
            channel_without_id.conversation(),
            Err(ValidationError::MissingField("channelId"))
        );

        let direct_without_recipient =
            TypingPayload { recipient: None, channel_id: Some(channel_id), is_channel: false };
        assert_eq!(
            direct_without_recipient.conversation(),
            Err(ValidationError::MissingField("recipient"))
        );

        let channel = TypingPayload { recipient: None, channel_id: Some(channel_id), is_channel: true };
        assert_eq!(channel.conversation(), Ok(Conversation::Channel(channel_id)));
    }

    #[test]
    fn stop_typing_notice_omits_sender_name() {
        let notice = TypingNotice::new(Uuid::new_v4(), Conversation::Direct(Uuid::new_v4()), None);
        let value = serde_json::to_value(ServerEvent::StopTyping(notice)).unwrap();
        assert_eq!(value["event"], "stop-typing");
        assert!(value["data"].get("senderName").is_none());
        assert!(value["data"].get("channelId").is_none());
        assert_eq!(value["data"]["isChannel"], false);
    }
}
