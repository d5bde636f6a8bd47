use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::hub::Hub;

pub(super) async fn channel_deleted(
    State(hub): State<Hub>,
    Path(channel_id): Path<Uuid>,
) -> StatusCode {
    hub.channel_deleted(channel_id).await;
    StatusCode::NO_CONTENT
}

pub(super) async fn member_removed(
    State(hub): State<Hub>,
    Path((channel_id, user_id)): Path<(Uuid, Uuid)>,
) -> StatusCode {
    hub.member_removed(channel_id, user_id).await;
    StatusCode::NO_CONTENT
}

pub(super) async fn member_left(
    State(hub): State<Hub>,
    Path((channel_id, user_id)): Path<(Uuid, Uuid)>,
) -> StatusCode {
    hub.member_left(channel_id, user_id).await;
    StatusCode::NO_CONTENT
}

pub(super) async fn member_added(
    State(hub): State<Hub>,
    Path((channel_id, user_id)): Path<(Uuid, Uuid)>,
) -> StatusCode {
    hub.member_added(channel_id, user_id).await;
    StatusCode::NO_CONTENT
}
