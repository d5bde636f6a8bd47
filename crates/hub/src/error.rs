use std::future::Future;

use axum::{
    http::{header::HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chatline_common::protocol::events::{ErrorNotice, ValidationError};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

tokio::task_local! {
    static REQUEST_ID: String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationFailed,
    AuthInvalidToken,
    AuthForbidden,
    NotFound,
    InternalError,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::AuthInvalidToken => "AUTH_INVALID_TOKEN",
            Self::AuthForbidden => "AUTH_FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub const fn status(self) -> StatusCode {
        match self {
            Self::ValidationFailed => StatusCode::BAD_REQUEST,
            Self::AuthInvalidToken => StatusCode::UNAUTHORIZED,
            Self::AuthForbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub const fn retryable(self) -> bool {
        matches!(self, Self::InternalError)
    }

    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ValidationFailed => "request validation failed",
            Self::AuthInvalidToken => "invalid authentication token",
            Self::AuthForbidden => "caller lacks required permission",
            Self::NotFound => "requested resource not found",
            Self::InternalError => "internal server error",
        }
    }
}

/// Failure of a single hub operation.
///
/// Routing misses are not errors: an offline party simply receives nothing.
#[derive(Debug, Error)]
pub enum HubError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl HubError {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::Forbidden(_) => ErrorCode::AuthForbidden,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Storage(_) => ErrorCode::InternalError,
        }
    }

    /// Frame sent back to the session whose event failed. Storage details stay in the logs.
    pub fn to_notice(&self) -> ErrorNotice {
        let code = self.code();
        let message = match self {
            Self::Storage(_) => code.default_message().to_string(),
            other => other.to_string(),
        };

        ErrorNotice { code: code.as_str().to_string(), message }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let code = self.code();
        match self {
            Self::Storage(error) => {
                tracing::error!(error = ?error, "hub storage failure");
                HttpError::from_code(code).into_response()
            }
            other => HttpError::new(code, other.to_string()).into_response(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpError {
    code: ErrorCode,
    message: String,
}

impl HttpError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let request_id = current_request_id();

        let mut response = (
            self.code.status(),
            Json(json!({
                "error": {
                    "code": self.code.as_str(),
                    "message": self.message,
                    "retryable": self.code.retryable(),
                    "request_id": request_id.clone(),
                    "details": {},
                }
            })),
        )
            .into_response();

        if let Some(request_id) = request_id {
            attach_request_id_header(&mut response, &request_id);
        }

        response
    }
}

pub async fn with_request_id_scope<F>(request_id: String, future: F) -> F::Output
where
    F: Future,
{
    REQUEST_ID.scope(request_id, future).await
}

pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(Clone::clone).ok()
}

pub fn request_id_from_headers_or_generate(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub fn attach_request_id_header(response: &mut Response, request_id: &str) {
    if let Ok(header) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header);
    }
}

#[cfg(test)]
mod tests {
    use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};
    use chatline_common::protocol::events::ValidationError;
    use serde_json::Value;

    use super::{with_request_id_scope, ErrorCode, HttpError, HubError};

    async fn body_json(response: axum::response::Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("error response body should be readable");
        serde_json::from_slice(&body).expect("error response body should be valid json")
    }

    #[tokio::test]
    async fn http_error_uses_scoped_request_id() {
        let response = with_request_id_scope("req-scoped-123".to_owned(), async {
            HttpError::from_code(ErrorCode::InternalError).into_response()
        })
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()["x-request-id"], "req-scoped-123");
        let parsed = body_json(response).await;
        assert_eq!(parsed["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(parsed["error"]["retryable"], true);
        assert_eq!(parsed["error"]["request_id"], "req-scoped-123");
        assert_eq!(parsed["error"]["details"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn hub_not_found_maps_to_404() {
        let response = HubError::NotFound("channel").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let parsed = body_json(response).await;
        assert_eq!(parsed["error"]["code"], "NOT_FOUND");
        assert_eq!(parsed["error"]["message"], "channel not found");
    }

    #[tokio::test]
    async fn storage_errors_do_not_leak_details() {
        let error = HubError::Storage(anyhow::anyhow!("connection reset by peer"));
        let notice = error.to_notice();
        assert_eq!(notice.code, "INTERNAL_ERROR");
        assert_eq!(notice.message, "internal server error");

        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let parsed = body_json(response).await;
        assert_eq!(parsed["error"]["message"], "internal server error");
    }

    #[test]
    fn validation_errors_carry_their_message() {
        let notice = HubError::from(ValidationError::MissingField("recipient")).to_notice();
        assert_eq!(notice.code, "VALIDATION_FAILED");
        assert_eq!(notice.message, "missing required field `recipient`");
    }
}
