//! API errors rendered the way Dropbox clients expect them
//!
//! Endpoint-specific failures are HTTP 409 with a JSON body of the form
//! `{"error_summary": "path/not_found/..", "error": {".tag": "path", "path": {".tag": "not_found"}}}`.
//! Bad input is HTTP 400 with a plain-text body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use boxgate_core::{CoreError, ErrorKind};
use boxgate_driver::DriverError;
use serde_json::{json, Value};
use thiserror::Error;

/// Names of the union members an endpoint reports lookup and write
/// failures under
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ErrorContext {
    /// Member for failures concerning the source path
    pub lookup: &'static str,
    /// Member for failures concerning the destination path
    pub write: &'static str,
}

impl ErrorContext {
    /// get_metadata, list_folder, create_folder, upload
    pub const PATH: Self = Self {
        lookup: "path",
        write: "path",
    };
    /// delete and delete_batch
    pub const PATH_LOOKUP: Self = Self {
        lookup: "path_lookup",
        write: "path_write",
    };
    /// move and copy
    pub const RELOCATION: Self = Self {
        lookup: "from_lookup",
        write: "to",
    };
}

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request arguments could not be parsed
    #[error("Error in call to API function \"{endpoint}\": {message}")]
    BadInput { endpoint: String, message: String },

    /// Missing, malformed or expired credentials
    #[error("{tag}: {message}")]
    Unauthorized { tag: &'static str, message: String },

    /// Request rate exceeded
    #[error("too many requests")]
    RateLimited { retry_after: u64 },

    /// Storage failure reported under an endpoint's error union
    #[error("{error}")]
    Core {
        error: CoreError,
        context: ErrorContext,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CoreError> for ApiError {
    fn from(error: CoreError) -> Self {
        Self::Core {
            error,
            context: ErrorContext::PATH,
        }
    }
}

impl ApiError {
    pub fn bad_input(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadInput {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn unauthorized(tag: &'static str, message: impl Into<String>) -> Self {
        Self::Unauthorized {
            tag,
            message: message.into(),
        }
    }

    /// Adapter for `map_err` on endpoints with their own error union
    pub fn within(context: ErrorContext) -> impl Fn(CoreError) -> Self {
        move |error| Self::Core { error, context }
    }

    /// HTTP status of this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadInput { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Core { error, .. } => core_status(error),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn core_status(error: &CoreError) -> StatusCode {
    match error {
        CoreError::MalformedCursor(_) => StatusCode::BAD_REQUEST,
        CoreError::IncompleteUpload(_) => StatusCode::CONFLICT,
        CoreError::NoAvailableRename(_) | CoreError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        e => match e.kind() {
            ErrorKind::Transient | ErrorKind::Other => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::CONFLICT,
        },
    }
}

/// The `error` union value for a storage failure
pub fn error_tag(error: &CoreError, context: ErrorContext) -> Value {
    let nested = |member: &str, inner: Value| json!({ ".tag": member, member: inner });
    match error {
        CoreError::TooManyFiles { .. } => json!({ ".tag": "too_many_files" }),
        CoreError::IntoItself(_) => json!({ ".tag": "cant_move_folder_into_itself" }),
        CoreError::JobNotFound(_) => json!({ ".tag": "invalid_async_job_id" }),
        CoreError::UploadSessionNotFound(_) => {
            nested("lookup_failed", json!({ ".tag": "not_found" }))
        }
        CoreError::IncompleteUpload(_) => {
            nested("lookup_failed", json!({ ".tag": "incorrect_offset" }))
        }
        CoreError::Driver(DriverError::NotADirectory(_)) => {
            nested(context.lookup, json!({ ".tag": "not_folder" }))
        }
        CoreError::Conflict(_) => nested(
            context.write,
            json!({ ".tag": "conflict", "conflict": { ".tag": "file" } }),
        ),
        e => match e.kind() {
            ErrorKind::NotFound => nested(context.lookup, json!({ ".tag": "not_found" })),
            ErrorKind::MalformedPath => {
                nested(context.lookup, json!({ ".tag": "malformed_path" }))
            }
            ErrorKind::Conflict => nested(
                context.write,
                json!({ ".tag": "conflict", "conflict": { ".tag": "folder" } }),
            ),
            _ => json!({ ".tag": "other" }),
        },
    }
}

/// Flatten an error union into `a/b/c/..`
pub fn error_summary(tag: &Value) -> String {
    let mut parts = Vec::new();
    let mut current = tag;
    while let Some(name) = current.get(".tag").and_then(Value::as_str) {
        parts.push(name.to_string());
        match current.get(name) {
            Some(inner) if inner.is_object() => current = inner,
            _ => break,
        }
    }
    format!("{}/..", parts.join("/"))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            ApiError::Core { error, context } if status == StatusCode::CONFLICT => {
                let tag = error_tag(&error, context);
                tracing::debug!(error = %error, "Endpoint error");
                let body = json!({ "error_summary": error_summary(&tag), "error": tag });
                (status, Json(body)).into_response()
            }
            ApiError::Unauthorized { tag, message } => {
                tracing::debug!(%message, "Unauthorized request");
                let error = json!({ ".tag": tag });
                let body = json!({ "error_summary": error_summary(&error), "error": error });
                (status, Json(body)).into_response()
            }
            ApiError::RateLimited { retry_after } => {
                let body = json!({
                    "error_summary": "too_many_requests/..",
                    "error": { "reason": { ".tag": "too_many_requests" }, "retry_after": retry_after },
                });
                (status, [("Retry-After", retry_after.to_string())], Json(body)).into_response()
            }
            other => {
                if status.is_server_error() {
                    tracing::error!(error = %other, "Request failed");
                }
                (status, [("Content-Type", "text/plain; charset=utf-8")], other.to_string())
                    .into_response()
            }
        }
    }
}
