// Collaborator callbacks over HTTP.
//
// The CRUD service and the assistant worker call these after they change
// channels or messages so that connected clients hear about it. Only hook
// tokens (see auth/service.rs) are accepted; end-user tokens get 401.

mod assistant;
mod channels;
mod messages;

use std::sync::Arc;

use axum::{middleware, routing::post, Router};

use crate::auth::{middleware::require_service_auth, service::ServiceTokenService};
use crate::hub::Hub;

pub fn router(hub: Hub, service_tokens: Arc<ServiceTokenService>) -> Router {
    Router::new()
        .route("/v1/hooks/channels/{channel_id}/deleted", post(channels::channel_deleted))
        .route(
            "/v1/hooks/channels/{channel_id}/members/{user_id}/removed",
            post(channels::member_removed),
        )
        .route(
            "/v1/hooks/channels/{channel_id}/members/{user_id}/left",
            post(channels::member_left),
        )
        .route(
            "/v1/hooks/channels/{channel_id}/members/{user_id}/added",
            post(channels::member_added),
        )
        .route("/v1/hooks/messages/{message_id}/edited", post(messages::message_edited))
        .route("/v1/hooks/messages/{message_id}/deleted", post(messages::message_deleted))
        .route("/v1/hooks/assistant/replies", post(assistant::assistant_reply))
        .route_layer(middleware::from_fn_with_state(service_tokens, require_service_auth))
        .with_state(hub)
}
