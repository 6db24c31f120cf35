//! Error taxonomy for calendar operations.

use std::fmt;
use thiserror::Error;

use gcalmcp_auth::{AuthError, AuthErrorCode};
use gcalmcp_core::WindowError;

/// The category of a calendar error.
///
/// These codes are stable and appear verbatim in HTTP error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalendarErrorCode {
    /// A credential source is not configured.
    ConfigMissing,
    /// A credential source is present but malformed.
    ConfigInvalid,
    /// No credential could be obtained.
    AuthenticationFailed,
    /// The provider rejected the credential (HTTP 401).
    Unauthenticated,
    /// The event or calendar does not exist (HTTP 404/410).
    NotFound,
    /// The request was malformed (HTTP 400/422 or local validation).
    InvalidRequest,
    /// Network failure, rate limiting or a provider outage.
    ProviderUnavailable,
    /// Anything else.
    Unknown,
}

impl CalendarErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigMissing => "config_missing",
            Self::ConfigInvalid => "config_invalid",
            Self::AuthenticationFailed => "authentication_failed",
            Self::Unauthenticated => "unauthenticated",
            Self::NotFound => "not_found",
            Self::InvalidRequest => "invalid_request",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CalendarErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<AuthErrorCode> for CalendarErrorCode {
    fn from(code: AuthErrorCode) -> Self {
        match code {
            AuthErrorCode::ConfigMissing => Self::ConfigMissing,
            AuthErrorCode::ConfigInvalid => Self::ConfigInvalid,
            AuthErrorCode::AuthenticationFailed => Self::AuthenticationFailed,
        }
    }
}

/// An error from a calendar operation.
#[derive(Debug, Error)]
pub struct CalendarError {
    code: CalendarErrorCode,
    message: String,
    /// HTTP status returned by the provider, if the call got that far.
    status: Option<u16>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CalendarError {
    pub fn new(code: CalendarErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            source: None,
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(CalendarErrorCode::Unauthenticated, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(CalendarErrorCode::NotFound, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(CalendarErrorCode::InvalidRequest, message)
    }

    pub fn provider_unavailable(message: impl Into<String>) -> Self {
        Self::new(CalendarErrorCode::ProviderUnavailable, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(CalendarErrorCode::Unknown, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> CalendarErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for CalendarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(status) = self.status {
            write!(f, " (HTTP {})", status)?;
        }
        Ok(())
    }
}

impl From<AuthError> for CalendarError {
    fn from(err: AuthError) -> Self {
        Self::new(err.code().into(), err.message().to_string()).with_source(err)
    }
}

impl From<WindowError> for CalendarError {
    fn from(err: WindowError) -> Self {
        Self::invalid_request(err.to_string())
    }
}

/// A specialized Result type for calendar operations.
pub type CalendarResult<T> = Result<T, CalendarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_status() {
        let err = CalendarError::not_found("event not found").with_status(404);
        assert_eq!(err.to_string(), "not_found: event not found (HTTP 404)");
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn auth_errors_keep_their_code() {
        let err: CalendarError = AuthError::authentication_failed("no usable credentials").into();
        assert_eq!(err.code(), CalendarErrorCode::AuthenticationFailed);
        assert_eq!(err.message(), "no usable credentials");

        let err: CalendarError = AuthError::config_invalid("bad key").into();
        assert_eq!(err.code(), CalendarErrorCode::ConfigInvalid);
    }

    #[test]
    fn only_provider_unavailable_is_retryable() {
        assert!(CalendarError::provider_unavailable("503").is_retryable());
        assert!(!CalendarError::unauthenticated("401").is_retryable());
        assert!(!CalendarError::unknown("?").is_retryable());
    }

    #[test]
    fn code_names_are_snake_case() {
        assert_eq!(CalendarErrorCode::ProviderUnavailable.as_str(), "provider_unavailable");
        assert_eq!(CalendarErrorCode::InvalidRequest.as_str(), "invalid_request");
        assert_eq!(CalendarErrorCode::Unauthenticated.to_string(), "unauthenticated");
    }
}
