use crate::{
    auth::service::ServiceTokenService,
    error::{ErrorCode, HttpError},
};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// The collaborator service a hook request was authenticated as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCaller {
    pub service: String,
}

/// Admits only hook tokens. End-user access tokens are rejected with 401.
pub async fn require_service_auth(
    State(service_tokens): State<Arc<ServiceTokenService>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer_token)
    {
        Some(token) => token,
        None => return unauthorized_response("missing service token"),
    };

    let service = match service_tokens.validate_service_token(token) {
        Ok(service) => service,
        Err(error) => {
            tracing::warn!(error = ?error, path = %request.uri().path(), "rejected hook credential");
            return unauthorized_response("invalid service token");
        }
    };

    request.extensions_mut().insert(ServiceCaller { service });

    next.run(request).await
}

pub(crate) fn extract_bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("Bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    Some(token)
}

pub(crate) fn unauthorized_response(message: &'static str) -> Response {
    HttpError::new(ErrorCode::AuthInvalidToken, message).into_response()
}
