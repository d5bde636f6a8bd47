use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chatline_common::protocol::events::ValidationError;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::HubError;
use crate::hub::{Hub, MessageAudience};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct MessageEditedRequest {
    new_content: String,
}

/// Either `channelId` or both `sender` and `recipient`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct MessageDeletedRequest {
    #[serde(default)]
    channel_id: Option<Uuid>,
    #[serde(default)]
    sender: Option<Uuid>,
    #[serde(default)]
    recipient: Option<Uuid>,
}

impl MessageDeletedRequest {
    fn audience(&self) -> Result<MessageAudience, ValidationError> {
        match (self.channel_id, self.sender, self.recipient) {
            (Some(channel_id), _, _) => Ok(MessageAudience::Channel(channel_id)),
            (None, Some(sender), Some(recipient)) => Ok(MessageAudience::Direct { sender, recipient }),
            (None, None, _) => Err(ValidationError::MissingField("sender")),
            (None, Some(_), None) => Err(ValidationError::MissingField("recipient")),
        }
    }
}

pub(super) async fn message_edited(
    State(hub): State<Hub>,
    Path(message_id): Path<Uuid>,
    Json(payload): Json<MessageEditedRequest>,
) -> Result<StatusCode, HubError> {
    hub.message_edited(message_id, payload.new_content).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn message_deleted(
    State(hub): State<Hub>,
    Path(message_id): Path<Uuid>,
    Json(payload): Json<MessageDeletedRequest>,
) -> Result<StatusCode, HubError> {
    hub.message_deleted(message_id, payload.audience()?).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_wins_over_direct_parties() {
        let channel_id = Uuid::new_v4();
        let request = MessageDeletedRequest {
            channel_id: Some(channel_id),
            sender: Some(Uuid::new_v4()),
            recipient: None,
        };
        assert_eq!(request.audience(), Ok(MessageAudience::Channel(channel_id)));
    }

    #[test]
    fn direct_audience_needs_both_parties() {
        let request =
            MessageDeletedRequest { channel_id: None, sender: Some(Uuid::new_v4()), recipient: None };
        assert_eq!(request.audience(), Err(ValidationError::MissingField("recipient")));
    }
}
