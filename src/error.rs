use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::models::{AppointmentStatus, Role};
use crate::store::StoreError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_role: Option<Role>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidField(String),
    #[error("Username already exists")]
    DuplicateUsername,
    #[error("Username or password is incorrect")]
    InvalidCredentials,
    #[error("This account is registered as a {actual}")]
    RoleMismatch { actual: Role },
    #[error("No token provided")]
    TokenMissing,
    #[error("Invalid token")]
    TokenInvalid,
    #[error("Session expired")]
    TokenExpired,
    #[error("{0}")]
    Forbidden(String),
    #[error("Doctor is not available")]
    DoctorUnavailable,
    #[error("{0}")]
    NotFound(String),
    #[error("This time slot is already booked")]
    SlotConflict,
    #[error("Cannot change status from {from} to {to}")]
    InvalidTransition { from: AppointmentStatus, to: String },
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid_field(msg: impl Into<String>) -> Self {
        ApiError::InvalidField(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ApiError::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidField(_) | ApiError::InvalidTransition { .. } => {
                StatusCode::BAD_REQUEST
            }
            ApiError::InvalidCredentials
            | ApiError::TokenMissing
            | ApiError::TokenInvalid
            | ApiError::TokenExpired => StatusCode::UNAUTHORIZED,
            ApiError::RoleMismatch { .. }
            | ApiError::Forbidden(_)
            | ApiError::DoctorUnavailable => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::DuplicateUsername | ApiError::SlotConflict => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidField(_) => "INVALID_FIELD",
            ApiError::DuplicateUsername => "DUPLICATE_USERNAME",
            ApiError::InvalidCredentials => "INVALID_CREDENTIALS",
            ApiError::RoleMismatch { .. } => "ROLE_MISMATCH",
            ApiError::TokenMissing => "TOKEN_MISSING",
            ApiError::TokenInvalid => "TOKEN_INVALID",
            ApiError::TokenExpired => "TOKEN_EXPIRED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::DoctorUnavailable => "DOCTOR_UNAVAILABLE",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::SlotConflict => "SLOT_CONFLICT",
            ApiError::InvalidTransition { .. } => "INVALID_TRANSITION",
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    fn to_error_response(&self) -> Json<ErrorResponse> {
        let message = match self {
            // Store/signing details stay in the logs.
            ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        let actual_role = match self {
            ApiError::RoleMismatch { actual } => Some(*actual),
            _ => None,
        };
        Json(ErrorResponse {
            error: ErrorObject {
                code: self.code().to_string(),
                message,
                actual_role,
            },
        })
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateUsername => ApiError::DuplicateUsername,
            StoreError::SlotTaken => ApiError::SlotConflict,
            StoreError::Backend(msg) => ApiError::Internal(format!("db error: {msg}")),
        }
    }
}

// Body and path extraction failures are client input errors like any other.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidField(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::InvalidField(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!(error = %detail, "request failed");
        }
        (self.status(), self.to_error_response()).into_response()
    }
}
