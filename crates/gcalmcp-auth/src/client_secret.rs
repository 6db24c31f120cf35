//! OAuth client secrets for the interactive consent flow.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{AuthError, AuthResult};
use crate::oauth::{GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL};

/// An OAuth client registration downloaded from the Google Cloud Console.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
    /// Redirect URIs registered for the client. Empty when the file does not
    /// list any.
    pub redirect_uris: Vec<String>,
}

/// Structure of the client secret JSON file.
///
/// Supports the console's `installed` and `web` layouts, plus a flat layout
/// with `client_id`/`client_secret` at the root.
#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<NestedSecret>,
    web: Option<NestedSecret>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedSecret {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    auth_uri: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

impl ClientSecret {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_uri: GOOGLE_AUTH_URL.to_string(),
            token_uri: GOOGLE_TOKEN_URL.to_string(),
            redirect_uris: Vec::new(),
        }
    }

    /// Reads a client secret file.
    ///
    /// A missing file is [`AuthErrorCode::ConfigMissing`](crate::AuthErrorCode),
    /// anything else that goes wrong is `ConfigInvalid`.
    pub fn from_file(path: &Path) -> AuthResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                AuthError::config_missing("client secret file not found")
            } else {
                AuthError::config_invalid("client secret file is unreadable").with_source(e)
            }
        })?;
        debug!("read client secret from {:?}", path);
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> AuthResult<Self> {
        let file: ClientSecretFile = serde_json::from_str(json).map_err(|e| {
            AuthError::config_invalid("client secret file is not valid JSON").with_source(e)
        })?;

        let secret = if let Some(nested) = file.installed.or(file.web) {
            Self {
                client_id: nested.client_id,
                client_secret: nested.client_secret,
                auth_uri: nested
                    .auth_uri
                    .unwrap_or_else(|| GOOGLE_AUTH_URL.to_string()),
                token_uri: nested
                    .token_uri
                    .unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
                redirect_uris: nested.redirect_uris,
            }
        } else if let (Some(client_id), Some(client_secret)) = (file.client_id, file.client_secret)
        {
            Self::new(client_id, client_secret)
        } else {
            return Err(AuthError::config_invalid(
                "client secret file must contain an 'installed' or 'web' section",
            ));
        };

        secret.validate()?;
        Ok(secret)
    }

    fn validate(&self) -> AuthResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::config_invalid("client_id is required"));
        }
        if self.client_secret.trim().is_empty() {
            return Err(AuthError::config_invalid("client_secret is required"));
        }
        Ok(())
    }

    /// Checks that `redirect` is one of the registered redirect URIs.
    ///
    /// A registered loopback URI without a port matches the same URI on any
    /// port, as Google does for installed apps. A file listing no redirect
    /// URIs accepts anything.
    pub fn check_redirect(&self, redirect: &Url) -> AuthResult<()> {
        if self.redirect_uris.is_empty() {
            return Ok(());
        }
        let registered = self
            .redirect_uris
            .iter()
            .filter_map(|uri| Url::parse(uri).ok())
            .any(|uri| redirect_matches(&uri, redirect));
        if registered {
            Ok(())
        } else {
            Err(AuthError::config_invalid(format!(
                "redirect URI {} is not registered for this OAuth client",
                redirect
            )))
        }
    }
}

fn redirect_matches(registered: &Url, redirect: &Url) -> bool {
    if registered.scheme() != redirect.scheme() || registered.host_str() != redirect.host_str() {
        return false;
    }
    let port_ok = match registered.port() {
        Some(port) => redirect.port_or_known_default() == Some(port),
        None => is_loopback(registered) || registered.port_or_known_default() == redirect.port_or_known_default(),
    };
    port_ok && registered.path().trim_end_matches('/') == redirect.path().trim_end_matches('/')
}

fn is_loopback(url: &Url) -> bool {
    matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"))
}

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecret")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .field("redirect_uris", &self.redirect_uris)
            .finish()
    }
}
