//! Error types and the response envelope.
//!
//! Every response, success or failure, has the same shape:
//!
//! ```text
//! { "success": bool, "message": "...", "code": "CONFLICT"?, "data": {...}? }
//! ```
//!
//! ```text
//! ┌─────────────────┬────────┬──────────────────┐
//! │ ServiceError     │ status │ code             │
//! ├─────────────────┼────────┼──────────────────┤
//! │ Unauthenticated  │ 401    │ UNAUTHENTICATED  │
//! │ Unauthorized     │ 403    │ UNAUTHORIZED     │
//! │ NotFound         │ 404    │ NOT_FOUND        │
//! │ Conflict         │ 409    │ CONFLICT         │
//! │ Validation       │ 400    │ VALIDATION       │
//! │ Internal         │ 500    │ INTERNAL         │
//! └─────────────────┴────────┴──────────────────┘
//! ```

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tally_core::AuthError;
use tally_db::ServiceError;
use tracing::error;

/// The envelope every handler answers with.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(ApiResponse {
            success: true,
            message: message.into(),
            code: None,
            data: Some(data),
        })
    }
}

/// API errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The request body could not be read as the expected JSON.
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Service(err.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidBody(rejection.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Service(ServiceError::Unauthenticated(_)) => StatusCode::UNAUTHORIZED,
            ApiError::Service(ServiceError::Unauthorized(_)) => StatusCode::FORBIDDEN,
            ApiError::Service(ServiceError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Service(ServiceError::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::Service(ServiceError::Validation(_)) | ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Service(ServiceError::Internal(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Service(ServiceError::Unauthenticated(_)) => "UNAUTHENTICATED",
            ApiError::Service(ServiceError::Unauthorized(_)) => "UNAUTHORIZED",
            ApiError::Service(ServiceError::NotFound(_)) => "NOT_FOUND",
            ApiError::Service(ServiceError::Conflict(_)) => "CONFLICT",
            ApiError::Service(ServiceError::Validation(_)) | ApiError::InvalidBody(_) => "VALIDATION",
            ApiError::Service(ServiceError::Internal(_)) => "INTERNAL",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        let body = ApiResponse::<()> {
            success: false,
            message: self.to_string(),
            code: Some(self.code()),
            data: None,
        };
        (status, Json(body)).into_response()
    }
}
