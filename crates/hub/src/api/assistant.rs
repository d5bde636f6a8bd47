use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::middleware::ServiceCaller;
use crate::error::HubError;
use crate::hub::Hub;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AssistantReplyRequest {
    user_id: Uuid,
    content: String,
}

pub(super) async fn assistant_reply(
    State(hub): State<Hub>,
    Extension(caller): Extension<ServiceCaller>,
    Json(payload): Json<AssistantReplyRequest>,
) -> Result<StatusCode, HubError> {
    let report = hub.deliver_assistant_reply(payload.user_id, &payload.content).await?;
    if report.delivered == 0 {
        tracing::debug!(
            user_id = %payload.user_id,
            caller = %caller.service,
            "assistant reply had no live session to reach"
        );
    }
    Ok(StatusCode::NO_CONTENT)
}
