use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::app::error::{PipelineError, Violation};

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    violations: Vec<Violation>,
    current_status: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    violations: Vec<Violation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_status: Option<String>,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            violations: Vec::new(),
            current_status: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(violations) => Self {
                violations,
                ..Self::bad_request("submission is invalid")
            },
            PipelineError::Authorization(message) => Self::forbidden(message),
            PipelineError::NotFound(what) => Self::not_found(format!("{} not found", what)),
            PipelineError::Conflict {
                message,
                current_status,
            } => Self {
                current_status: Some(current_status),
                ..Self::conflict(message)
            },
            PipelineError::Duplicate(message) => Self::conflict(message),
            PipelineError::Dependency(detail) => {
                tracing::error!(detail = %detail, "dependency unavailable");
                Self::unavailable("a required service is unavailable, please retry later")
            }
            PipelineError::Publish(detail) => {
                tracing::error!(detail = %detail, "publication failed");
                Self::unavailable("the decision could not be published, please retry later")
            }
            PipelineError::Storage(err) => {
                tracing::error!(error = ?err, "storage failure");
                Self::internal("internal error")
            }
        }
    }
}

/// Bodies that are not a JSON object of the right shape. Field-level
/// problems inside a submission are reported as violations instead.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
            violations: self.violations,
            current_status: self.current_status,
        });
        (self.status, body).into_response()
    }
}
