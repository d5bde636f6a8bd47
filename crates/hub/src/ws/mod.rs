// WebSocket transport: one task per connection feeding the hub.

pub mod protocol;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap},
    response::IntoResponse,
    routing::get,
    Router,
};
use chatline_common::protocol::events::ServerEvent;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::auth::{
    jwt::JwtAccessTokenService,
    middleware::{extract_bearer_token, unauthorized_response},
};
use crate::error::{request_id_from_headers_or_generate, with_request_id_scope, HubError};
use crate::hub::{ConnectedSession, Hub};

pub(crate) const HEARTBEAT_INTERVAL_MS: u64 = 15_000;
pub(crate) const HEARTBEAT_TIMEOUT_MS: u64 = 10_000;
pub(crate) const MAX_FRAME_BYTES: usize = 262_144;

#[derive(Clone)]
struct WsState {
    hub: Hub,
    jwt_service: Arc<JwtAccessTokenService>,
}

#[derive(Debug, Deserialize)]
struct WsParams {
    token: Option<String>,
}

pub fn router(hub: Hub, jwt_service: Arc<JwtAccessTokenService>) -> Router {
    Router::new().route("/v1/ws", get(ws_upgrade)).with_state(WsState { hub, jwt_service })
}

async fn ws_upgrade(
    State(state): State<WsState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let header_token =
        headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok()).and_then(extract_bearer_token);
    let Some(token) = params.token.as_deref().filter(|token| !token.is_empty()).or(header_token)
    else {
        return unauthorized_response("missing access token");
    };

    let user_id = match state.jwt_service.validate_user_token(token) {
        Ok(user_id) => user_id,
        Err(error) => {
            debug!(error = ?error, "rejected websocket handshake");
            return unauthorized_response("invalid access token");
        }
    };

    let request_id = request_id_from_headers_or_generate(&headers);
    let hub = state.hub.clone();
    ws.max_frame_size(MAX_FRAME_BYTES)
        .max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| with_request_id_scope(request_id, handle_socket(hub, user_id, socket)))
}

fn is_frame_size_violation(error: &axum::Error) -> bool {
    let message = error.to_string().to_ascii_lowercase();
    message.contains("message too long")
        || message.contains("frame too long")
        || message.contains("too large")
        || message.contains("too big")
}

async fn close_frame_too_large(socket: &mut WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::SIZE,
            reason: format!("websocket frame exceeds maximum size of {MAX_FRAME_BYTES} bytes").into(),
        })))
        .await;
}

async fn handle_socket(hub: Hub, user_id: Uuid, mut socket: WebSocket) {
    let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<ServerEvent>();
    let session = hub.connect(user_id, outbound_sender.clone()).await;

    // Ping every interval; a ping still unanswered after the timeout ends the session.
    let mut heartbeat_interval = tokio::time::interval(Duration::from_millis(HEARTBEAT_INTERVAL_MS));
    heartbeat_interval.reset();
    let heartbeat_timeout = Duration::from_millis(HEARTBEAT_TIMEOUT_MS);
    let mut pending_ping: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = heartbeat_interval.tick() => {
                if pending_ping.is_some_and(|sent_at| sent_at.elapsed() > heartbeat_timeout) {
                    warn!(session_id = %session.session_id, user_id = %user_id, "heartbeat timeout, disconnecting");
                    break;
                }
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                pending_ping.get_or_insert_with(Instant::now);
            }
            maybe_outbound = outbound_receiver.recv() => {
                let Some(event) = maybe_outbound else {
                    break;
                };
                if protocol::send_server_event(&mut socket, &event).await.is_err() {
                    break;
                }
            }
            maybe_message = socket.recv() => {
                let Some(message) = maybe_message else {
                    break;
                };

                match message {
                    Ok(Message::Text(raw)) => {
                        if raw.as_str().len() > MAX_FRAME_BYTES {
                            close_frame_too_large(&mut socket).await;
                            break;
                        }
                        handle_text_frame(&hub, session, raw.as_str(), &outbound_sender).await;
                    }
                    Ok(Message::Binary(_)) => {
                        let _ = outbound_sender
                            .send(protocol::invalid_frame("binary frames are not supported"));
                    }
                    Ok(Message::Pong(_)) => pending_ping = None,
                    Ok(Message::Ping(_)) => {}
                    Ok(Message::Close(_)) => break,
                    Err(error) if is_frame_size_violation(&error) => {
                        close_frame_too_large(&mut socket).await;
                        break;
                    }
                    Err(error) => {
                        debug!(session_id = %session.session_id, error = ?error, "websocket receive failed");
                        break;
                    }
                }
            }
        }
    }

    hub.disconnect(session.session_id).await;
}

/// Decodes and dispatches one frame. Failures are answered on this
/// connection only, queued behind any events already pending for it.
async fn handle_text_frame(
    hub: &Hub,
    session: ConnectedSession,
    raw: &str,
    outbound: &mpsc::UnboundedSender<ServerEvent>,
) {
    let event = match protocol::decode_client_event(raw) {
        Ok(event) => event,
        Err(error) => {
            debug!(session_id = %session.session_id, error = %error, "undecodable websocket frame");
            let _ = outbound.send(protocol::invalid_frame("invalid event frame"));
            return;
        }
    };

    let name = event.name();
    if let Err(error) = hub.dispatch(session, event).await {
        match &error {
            HubError::Storage(cause) => error!(
                session_id = %session.session_id,
                user_id = %session.user_id,
                event = name,
                error = ?cause,
                "event failed on storage"
            ),
            other => debug!(
                session_id = %session.session_id,
                user_id = %session.user_id,
                event = name,
                error = %other,
                "event rejected"
            ),
        }
        let _ = outbound.send(ServerEvent::Error(error.to_notice()));
    }
}
