//! Resolver configuration.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::credential::ScopeSet;
use crate::error::{AuthError, AuthResult};

/// Full read/write access to the user's calendars.
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

/// Redirect URI of the loopback consent flow.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080/";

/// Where each credential source lives and how the resolver behaves.
///
/// Built once at startup and passed to
/// [`CredentialResolver::new`](crate::CredentialResolver::new); nothing in
/// this crate reads the environment.
#[derive(Clone)]
pub struct ResolverConfig {
    /// Inline service-account key, base64 of the key JSON.
    pub embedded_credentials: Option<String>,
    /// Path to a service-account key file.
    pub service_account_path: Option<PathBuf>,
    /// Where user tokens are persisted.
    pub token_path: PathBuf,
    /// OAuth client secret used by the consent flow.
    pub client_secret_path: PathBuf,
    /// Fixed redirect URI for the consent flow.
    pub redirect_uri: String,
    /// Scopes used when a caller passes an empty scope set.
    pub default_scopes: ScopeSet,
    /// Upper bound on one interactive authorization.
    pub interactive_timeout: Duration,
    /// Timeout for token endpoint requests.
    pub http_timeout: Duration,
    /// Tokens expiring within this window are treated as expired.
    pub expiry_skew: Duration,
    /// Whether the consent flow launches a browser.
    pub open_browser: bool,
}

impl ResolverConfig {
    pub const DEFAULT_INTERACTIVE_TIMEOUT_SECS: u64 = 300;
    pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_EXPIRY_SKEW_SECS: u64 = 60;

    /// Creates a configuration with every file under `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            embedded_credentials: None,
            service_account_path: Some(data_dir.join("service_account.json")),
            token_path: data_dir.join("token.json"),
            client_secret_path: data_dir.join("credentials.json"),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            default_scopes: ScopeSet::new([DEFAULT_SCOPE]),
            interactive_timeout: Duration::from_secs(Self::DEFAULT_INTERACTIVE_TIMEOUT_SECS),
            http_timeout: Duration::from_secs(Self::DEFAULT_HTTP_TIMEOUT_SECS),
            expiry_skew: Duration::from_secs(Self::DEFAULT_EXPIRY_SKEW_SECS),
            open_browser: true,
        }
    }

    /// Returns the default data directory (`~/.local/share/gcalmcp` on Linux).
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gcalmcp")
    }

    pub fn with_embedded_credentials(mut self, payload: impl Into<String>) -> Self {
        self.embedded_credentials = Some(payload.into());
        self
    }

    pub fn with_service_account_path(mut self, path: Option<PathBuf>) -> Self {
        self.service_account_path = path;
        self
    }

    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    pub fn with_client_secret_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.client_secret_path = path.into();
        self
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = uri.into();
        self
    }

    pub fn with_default_scopes(mut self, scopes: ScopeSet) -> Self {
        self.default_scopes = scopes;
        self
    }

    pub fn with_interactive_timeout(mut self, timeout: Duration) -> Self {
        self.interactive_timeout = timeout;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_expiry_skew(mut self, skew: Duration) -> Self {
        self.expiry_skew = skew;
        self
    }

    pub fn with_open_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }

    /// Parses the redirect URI.
    pub fn redirect_url(&self) -> AuthResult<Url> {
        let url = Url::parse(&self.redirect_uri).map_err(|e| {
            AuthError::config_invalid("redirect URI is not a valid URL").with_source(e)
        })?;
        if url.scheme() != "http" {
            return Err(AuthError::config_invalid(
                "redirect URI must use plain http on a loopback host",
            ));
        }
        match url.host_str() {
            Some("localhost" | "127.0.0.1" | "[::1]") => Ok(url),
            _ => Err(AuthError::config_invalid(
                "redirect URI must point at a loopback host",
            )),
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> AuthResult<()> {
        if self.default_scopes.is_empty() {
            return Err(AuthError::config_invalid(
                "at least one OAuth scope is required",
            ));
        }
        if self.interactive_timeout.is_zero() {
            return Err(AuthError::config_invalid(
                "interactive timeout must be greater than zero",
            ));
        }
        if self.http_timeout.is_zero() {
            return Err(AuthError::config_invalid(
                "HTTP timeout must be greater than zero",
            ));
        }
        self.redirect_url()?;
        Ok(())
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::new(Self::default_data_dir())
    }
}

impl fmt::Debug for ResolverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverConfig")
            .field(
                "embedded_credentials",
                &self.embedded_credentials.as_ref().map(|_| "[redacted]"),
            )
            .field("service_account_path", &self.service_account_path)
            .field("token_path", &self.token_path)
            .field("client_secret_path", &self.client_secret_path)
            .field("redirect_uri", &self.redirect_uri)
            .field("default_scopes", &self.default_scopes)
            .field("interactive_timeout", &self.interactive_timeout)
            .field("http_timeout", &self.http_timeout)
            .field("expiry_skew", &self.expiry_skew)
            .field("open_browser", &self.open_browser)
            .finish()
    }
}
