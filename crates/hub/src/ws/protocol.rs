use axum::extract::ws::{Message, WebSocket};
use chatline_common::protocol::events::{ClientEvent, ErrorNotice, ServerEvent};

use crate::error::ErrorCode;

pub fn decode_client_event(raw: &str) -> Result<ClientEvent, serde_json::Error> {
    serde_json::from_str::<ClientEvent>(raw)
}

pub fn encode_server_event(event: &ServerEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

pub(crate) async fn send_server_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), ()> {
    let encoded = encode_server_event(event).map_err(|_| ())?;
    socket.send(Message::Text(encoded.into())).await.map_err(|_| ())
}

pub(crate) fn invalid_frame(message: impl Into<String>) -> ServerEvent {
    ServerEvent::Error(ErrorNotice {
        code: ErrorCode::ValidationFailed.as_str().to_string(),
        message: message.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn decodes_client_frames_by_event_name() {
        let recipient = Uuid::new_v4();
        let raw = format!(
            r#"{{"event":"stop-typing","data":{{"recipient":"{recipient}","isChannel":false}}}}"#
        );

        match decode_client_event(&raw).expect("frame should decode") {
            ClientEvent::StopTyping(payload) => assert_eq!(payload.recipient, Some(recipient)),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_event_names() {
        assert!(decode_client_event(r#"{"event":"join-room","data":{}}"#).is_err());
        assert!(decode_client_event("not json").is_err());
    }

    #[test]
    fn invalid_frame_notice_uses_validation_code() {
        let encoded = encode_server_event(&invalid_frame("bad frame")).expect("should encode");
        let value: serde_json::Value = serde_json::from_str(&encoded).expect("valid json");
        assert_eq!(value["event"], "error");
        assert_eq!(value["data"]["code"], "VALIDATION_FAILED");
        assert_eq!(value["data"]["message"], "bad frame");
    }
}
