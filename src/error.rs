use crate::models::ValidationIssue;
use crate::session::SessionError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub field: String,
    pub issue: String,
}

impl From<ValidationIssue> for ErrorDetail {
    fn from(issue: ValidationIssue) -> Self {
        Self {
            field: issue.field,
            issue: issue.issue,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: ErrorPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ErrorDetail>,
    pub request_id: String,
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Vec<ErrorDetail>,
    pub request_id: String,
}

impl AppError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: Vec::new(),
            request_id: request_id.into(),
        }
    }

    pub fn with_details(mut self, details: Vec<ErrorDetail>) -> Self {
        self.details = details;
        self
    }

    /// Core state-machine errors surface as safe-to-retry responses, never as
    /// crashes: an empty selection is ordinary input validation, everything
    /// else is a state conflict pointing the client back to a safe screen.
    pub fn from_session(err: SessionError, request_id: impl Into<String>) -> Self {
        match err {
            SessionError::MissingSelection => Self::new(
                StatusCode::BAD_REQUEST,
                "MISSING_SELECTION",
                "please select an answer",
                request_id,
            ),
            SessionError::UnknownOption { .. } => Self::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                err.to_string(),
                request_id,
            ),
            SessionError::NotInProgress
            | SessionError::ReviewIsReadOnly
            | SessionError::IndexOutOfRange { .. } => Self::new(
                StatusCode::CONFLICT,
                "INVALID_STATE",
                err.to_string(),
                request_id,
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let payload = ErrorBody {
            error: ErrorPayload {
                code: self.code,
                message: self.message,
                details: self.details,
                request_id: self.request_id,
            },
        };
        (self.status, Json(payload)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_errors_map_to_stable_codes() {
        let missing = AppError::from_session(SessionError::MissingSelection, "req-1");
        assert_eq!(missing.status, StatusCode::BAD_REQUEST);
        assert_eq!(missing.code, "MISSING_SELECTION");

        let idle = AppError::from_session(SessionError::NotInProgress, "req-2");
        assert_eq!(idle.status, StatusCode::CONFLICT);
        assert_eq!(idle.code, "INVALID_STATE");

        let review = AppError::from_session(SessionError::ReviewIsReadOnly, "req-3");
        assert_eq!(review.code, "INVALID_STATE");
    }
}
