use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::contracts::HandlerResult;

/// Failure of a handler or middleware, rendered as `{"message": ..., "status": ...}`.
///
/// Without an explicit status the response uses the error status the handler
/// already set on its context, or 500.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HttpError {
    status: Option<StatusCode>,
    message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// An error that takes its status from the request context (500 if none).
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Returned by controllers whose `invoke` does not know the handler name.
    pub fn unknown_handler(handler: &str) -> Self {
        Self::internal_error(format!("no handler named '{handler}'"))
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn resolve_status(&self, context_status: Option<StatusCode>) -> StatusCode {
        self.status
            .or(context_status.filter(|s| !s.is_success() && !s.is_informational()))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub(crate) fn into_response_with(self, context_status: Option<StatusCode>) -> Response {
        let status = self.resolve_status(context_status);
        let body = json!({ "message": self.message, "status": status.as_u16() });
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for HttpError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<HttpError>() {
            Ok(http) => http,
            Err(other) => Self::msg(format!("{other:#}")),
        }
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal_error(format!("failed to serialize response: {err}"))
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        self.into_response_with(None)
    }
}

/// Serialize a handler's return value.
pub fn json<T: Serialize>(value: T) -> HandlerResult {
    Ok(Some(serde_json::to_value(value)?))
}
