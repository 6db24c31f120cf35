//! Server error types.

use std::io;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gcalmcp_auth::AuthError;
use gcalmcp_calendar::{CalendarError, CalendarErrorCode};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that stop the server from starting or running.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error (bind, accept).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Credential configuration could not be loaded.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Calendar client could not be built.
    #[error("Calendar error: {0}")]
    Calendar(#[from] CalendarError),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// An error returned to an HTTP caller.
///
/// The body is always `{"error": {"code": ..., "message": ...}}`. Messages
/// are fixed per code except for request validation, which echoes the local
/// validation failure. Details only go to the log.
#[derive(Debug)]
pub enum ApiError {
    /// The inbound request failed the trust-model check.
    Unauthorized,
    /// The request could not be parsed or failed validation.
    BadRequest(String),
    /// A calendar or credential failure.
    Calendar(CalendarError),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::BadRequest(_) => CalendarErrorCode::InvalidRequest.as_str(),
            Self::Calendar(err) => err.code().as_str(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Calendar(err) => status_for(err.code()),
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Unauthorized => "missing or invalid bearer token".to_string(),
            Self::BadRequest(message) => message.clone(),
            Self::Calendar(err) => match err.code() {
                CalendarErrorCode::InvalidRequest if err.status().is_none() => {
                    err.message().to_string()
                }
                code => fixed_message(code).to_string(),
            },
        }
    }
}

fn status_for(code: CalendarErrorCode) -> StatusCode {
    match code {
        CalendarErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
        CalendarErrorCode::Unauthenticated | CalendarErrorCode::AuthenticationFailed => {
            StatusCode::UNAUTHORIZED
        }
        CalendarErrorCode::NotFound => StatusCode::NOT_FOUND,
        CalendarErrorCode::ProviderUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        CalendarErrorCode::ConfigMissing
        | CalendarErrorCode::ConfigInvalid
        | CalendarErrorCode::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn fixed_message(code: CalendarErrorCode) -> &'static str {
    match code {
        CalendarErrorCode::ConfigMissing => "calendar credentials are not configured",
        CalendarErrorCode::ConfigInvalid => "calendar credentials are misconfigured",
        CalendarErrorCode::AuthenticationFailed => "could not obtain calendar credentials",
        CalendarErrorCode::Unauthenticated => "calendar provider rejected the credentials",
        CalendarErrorCode::NotFound => "Event not found",
        CalendarErrorCode::InvalidRequest => "calendar provider rejected the request",
        CalendarErrorCode::ProviderUnavailable => "calendar provider is unavailable, try again later",
        CalendarErrorCode::Unknown => "internal server error",
    }
}

impl From<CalendarError> for ApiError {
    fn from(err: CalendarError) -> Self {
        Self::Calendar(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Calendar(err) if status.is_server_error() => {
                error!(code = %err.code(), error = %err, "calendar request failed");
            }
            Self::Calendar(err) => warn!(code = %err.code(), error = %err, "calendar request failed"),
            Self::BadRequest(message) => warn!(%message, "rejected request"),
            Self::Unauthorized => {}
        }

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.public_message(),
            }
        }));
        (status, body).into_response()
    }
}
