//! Error types for credential resolution.
//!
//! Only three codes ever leave the resolver. Per-source failures (a bad
//! embedded key, an unreadable token file, a rejected refresh) are logged and
//! absorbed while the resolver moves on to the next source.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The category of an authentication error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorCode {
    /// A required configuration value or file is absent.
    ConfigMissing,
    /// A configuration value or file is present but malformed.
    ConfigInvalid,
    /// No credential could be obtained from any source.
    AuthenticationFailed,
}

impl AuthErrorCode {
    /// Returns the wire name for this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigMissing => "config_missing",
            Self::ConfigInvalid => "config_invalid",
            Self::AuthenticationFailed => "authentication_failed",
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised while loading configuration or acquiring a credential.
///
/// Cloneable so a single interactive authorization result can be handed to
/// every caller that was waiting on it.
#[derive(Debug, Clone, Error)]
pub struct AuthError {
    code: AuthErrorCode,
    message: String,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl AuthError {
    /// Creates a new error with the given code and message.
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a missing-configuration error.
    pub fn config_missing(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::ConfigMissing, message)
    }

    /// Creates an invalid-configuration error.
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::ConfigInvalid, message)
    }

    /// Creates an authentication failure.
    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::AuthenticationFailed, message)
    }

    /// Sets the source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> AuthErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;
