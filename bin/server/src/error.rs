//! HTTP-facing error type.
//!
//! Domain errors from the messaging crate carry a machine-readable
//! [`ErrorKind`]. `ApiError` keeps that kind, replaces store details with a
//! user-safe message, and renders as `{"success": false, "kind", "message"}`.

use alumnet_messaging::{ErrorKind, IngestError, RegistryError};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use std::fmt;

/// An error reported to an HTTP or WebSocket client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    /// Machine-readable category.
    pub kind: ErrorKind,
    /// Human-readable explanation, safe to show to clients.
    pub message: String,
}

impl ApiError {
    /// A rejected request.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InvalidArgument,
            message: message.into(),
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::PersistenceFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::InvalidArgument { reason } => Self::invalid(reason),
            IngestError::Persistence(store) => {
                tracing::error!(error = %store, "message store failure");
                Self {
                    kind: ErrorKind::PersistenceFailure,
                    message: "Message store unavailable".to_string(),
                }
            }
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        Self::invalid(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "kind": self.kind,
            "message": self.message,
        });
        (self.status(), Json(body)).into_response()
    }
}
