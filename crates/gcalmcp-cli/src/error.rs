//! CLI error types.

use gcalmcp_auth::AuthError;
use gcalmcp_server::ServerError;
use thiserror::Error;

use crate::secret::SecretError;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration file or value error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A secret reference could not be expanded.
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),

    /// Credential resolution failed.
    #[error("{0}")]
    Auth(#[from] AuthError),

    /// The server failed to start or stopped with an error.
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
