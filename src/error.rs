//! Unified application error model and mapping helpers.
//! This module provides the common error enum used across the HTTP handlers
//! and the filesystem core, the central mapping from OS errors into it, and
//! the JSON error envelope returned to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    Validation { code: String, message: String },
    NotFound { code: String, message: String },
    InvalidOperation { code: String, message: String },
    Forbidden { code: String, message: String },
    PayloadTooLarge { code: String, message: String },
    UnsupportedType { code: String, message: String },
    Busy { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Validation { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::InvalidOperation { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::PayloadTooLarge { code, .. }
            | AppError::UnsupportedType { code, .. }
            | AppError::Busy { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Validation { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::InvalidOperation { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::PayloadTooLarge { message, .. }
            | AppError::UnsupportedType { message, .. }
            | AppError::Busy { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn validation<S: Into<String>>(code: S, msg: S) -> Self { AppError::Validation { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn invalid_op<S: Into<String>>(code: S, msg: S) -> Self { AppError::InvalidOperation { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn payload_too_large<S: Into<String>>(code: S, msg: S) -> Self { AppError::PayloadTooLarge { code: code.into(), message: msg.into() } }
    pub fn unsupported_type<S: Into<String>>(code: S, msg: S) -> Self { AppError::UnsupportedType { code: code.into(), message: msg.into() } }
    pub fn busy<S: Into<String>>(code: S, msg: S) -> Self { AppError::Busy { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Containment violation detected by the path resolver.
    pub fn traversal() -> Self {
        AppError::forbidden("forbidden", "Path traversal detected")
    }

    /// Root-protection violation (deleting or renaming the root itself).
    pub fn forbidden_root<S: Into<String>>(msg: S) -> Self {
        AppError::Forbidden { code: "forbidden_root_operation".into(), message: msg.into() }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Validation { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::InvalidOperation { .. } => 400,
            AppError::Forbidden { .. } => 403,
            AppError::PayloadTooLarge { .. } => 413,
            AppError::UnsupportedType { .. } => 415,
            AppError::Busy { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

/// Central OS-error mapping. Individual operations propagate `std::io::Error`
/// with `?` and this translation decides the status and stable code once.
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let message = err.to_string();
        #[cfg(unix)]
        {
            // EMFILE / ENFILE: process or system file-table exhaustion
            if matches!(err.raw_os_error(), Some(23) | Some(24)) {
                return AppError::Busy { code: "server_busy".into(), message };
            }
        }
        match err.kind() {
            ErrorKind::NotFound => AppError::NotFound { code: "not_found".into(), message },
            ErrorKind::PermissionDenied => AppError::Forbidden { code: "forbidden".into(), message },
            ErrorKind::NotADirectory => AppError::InvalidOperation { code: "not_a_directory".into(), message },
            ErrorKind::IsADirectory => AppError::InvalidOperation { code: "is_directory".into(), message },
            ErrorKind::AlreadyExists => AppError::InvalidOperation { code: "invalid_operation".into(), message },
            _ => AppError::Internal { code: "internal_error".into(), message },
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<AppError>() {
            Ok(app) => app,
            Err(other) => AppError::Internal { code: "internal_error".into(), message: other.to_string() },
        }
    }
}

/// JSON error envelope: `{"error": {"code", "message"}}` with the mapped
/// status. Failures are also logged here so handlers do not repeat it.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(target: "http", code = self.code_str(), message = self.message(), status = status.as_u16(), "request failed");
        } else {
            tracing::warn!(target: "http", code = self.code_str(), message = self.message(), status = status.as_u16(), "request failed");
        }
        let body = json!({ "error": { "code": self.code_str(), "message": self.message() } });
        (status, Json(body)).into_response()
    }
}
