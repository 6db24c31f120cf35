//! Application configuration.
//!
//! Settings are layered, last wins:
//!
//! 1. `config.toml` (default `~/.config/gcalmcp/config.toml`)
//! 2. `.env` in the working directory, loaded into the environment at startup
//! 3. environment variables and command-line flags
//!
//! `credentials_config` and `jwt_secret` accept secret references
//! (`env::VAR`, `pass::path`), expanded when the configuration is turned into
//! resolver and server settings.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use gcalmcp_auth::{ResolverConfig, ScopeSet};
use gcalmcp_server::{JwtSettings, ServerConfig, TrustModel, TrustModelKind};
use serde::{Deserialize, Serialize};

use crate::cli::Overrides;
use crate::error::{CliError, CliResult};
use crate::secret;

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Debug logging.
    pub debug: bool,

    /// Credential sources.
    pub auth: AuthSettings,

    /// HTTP server.
    pub server: ServerSettings,
}

/// `[auth]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Directory holding token.json, credentials.json and service_account.json.
    pub data_dir: Option<PathBuf>,

    /// Base64 service-account key (supports secret references).
    pub credentials_config: Option<String>,

    pub service_account_path: Option<PathBuf>,

    pub token_path: Option<PathBuf>,

    /// OAuth client secret for the consent flow.
    pub credentials_path: Option<PathBuf>,

    pub redirect_uri: Option<String>,

    /// OAuth scopes; the calendar scope when empty.
    pub scopes: Vec<String>,

    /// Seconds to wait for browser consent.
    pub interactive_timeout_secs: Option<u64>,

    pub open_browser: Option<bool>,
}

/// `[server]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: Option<String>,

    pub port: Option<u16>,

    pub calendar_id: Option<String>,

    /// Seconds before a calendar API call is abandoned.
    pub http_timeout_secs: Option<u64>,

    /// `none` or `bearer-jwt`.
    pub trust_model: Option<String>,

    /// Shared HS256 secret (supports secret references).
    pub jwt_secret: Option<String>,

    pub jwt_audience: Option<String>,

    pub jwt_issuer: Option<String>,
}

/// Keeps `value` unless it is absent or blank.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    /// Loads `path` if given, else the default file if it exists.
    pub fn load(path: Option<&Path>) -> CliResult<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            CliError::config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gcalmcp")
            .join("config.toml")
    }

    /// Applies flag and environment overrides on top of the file.
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        let auth = &mut self.auth;
        if let Some(v) = non_blank(overrides.credentials_config.clone()) {
            auth.credentials_config = Some(v);
        }
        if let Some(v) = &overrides.service_account_path {
            auth.service_account_path = Some(v.clone());
        }
        if let Some(v) = &overrides.token_path {
            auth.token_path = Some(v.clone());
        }
        if let Some(v) = &overrides.credentials_path {
            auth.credentials_path = Some(v.clone());
        }

        let server = &mut self.server;
        if let Some(v) = non_blank(overrides.host.clone()) {
            server.host = Some(v);
        }
        if let Some(v) = overrides.port {
            server.port = Some(v);
        }
        if let Some(v) = non_blank(overrides.trust_model.clone()) {
            server.trust_model = Some(v);
        }
        if let Some(v) = non_blank(overrides.jwt_secret.clone()) {
            server.jwt_secret = Some(v);
        }
        if let Some(v) = non_blank(overrides.jwt_audience.clone()) {
            server.jwt_audience = Some(v);
        }
        if let Some(v) = non_blank(overrides.jwt_issuer.clone()) {
            server.jwt_issuer = Some(v);
        }
    }

    /// Builds the credential resolver settings, expanding secret references.
    pub fn resolver_config(&self) -> CliResult<ResolverConfig> {
        let auth = &self.auth;
        let data_dir = auth
            .data_dir
            .clone()
            .unwrap_or_else(ResolverConfig::default_data_dir);
        let mut config = ResolverConfig::new(data_dir);

        if let Some(raw) = non_blank(auth.credentials_config.clone()) {
            config = config.with_embedded_credentials(secret::resolve(&raw)?);
        }
        if let Some(path) = &auth.service_account_path {
            config = config.with_service_account_path(Some(path.clone()));
        }
        if let Some(path) = &auth.token_path {
            config = config.with_token_path(path);
        }
        if let Some(path) = &auth.credentials_path {
            config = config.with_client_secret_path(path);
        }
        if let Some(uri) = &auth.redirect_uri {
            config = config.with_redirect_uri(uri);
        }
        if !auth.scopes.is_empty() {
            config = config.with_default_scopes(ScopeSet::new(&auth.scopes));
        }
        if let Some(secs) = auth.interactive_timeout_secs {
            config = config.with_interactive_timeout(Duration::from_secs(secs));
        }
        if let Some(open) = auth.open_browser {
            config = config.with_open_browser(open);
        }

        config.validate()?;
        Ok(config)
    }

    /// Builds the HTTP server settings, expanding secret references.
    pub fn server_config(&self) -> CliResult<ServerConfig> {
        let settings = &self.server;
        let mut config = ServerConfig::default();

        if let Some(host) = &settings.host {
            config.host = host
                .parse::<IpAddr>()
                .map_err(|_| CliError::config(format!("invalid host address '{}'", host)))?;
        }
        if let Some(port) = settings.port {
            config.port = port;
        }
        if let Some(calendar_id) = &settings.calendar_id {
            config = config.with_calendar_id(calendar_id);
        }
        if let Some(secs) = settings.http_timeout_secs {
            config = config.with_http_timeout(Duration::from_secs(secs));
        }

        let kind = settings
            .trust_model
            .as_deref()
            .unwrap_or_default()
            .parse::<TrustModelKind>()?;
        let trust = match kind {
            TrustModelKind::None => TrustModel::None,
            TrustModelKind::BearerJwt => {
                let raw = non_blank(settings.jwt_secret.clone()).ok_or_else(|| {
                    CliError::config("bearer-jwt trust model requires jwt_secret (GCALMCP_JWT_SECRET)")
                })?;
                let mut jwt = JwtSettings::new(secret::resolve(&raw)?);
                if let Some(audience) = &settings.jwt_audience {
                    jwt = jwt.with_audience(audience);
                }
                if let Some(issuer) = &settings.jwt_issuer {
                    jwt = jwt.with_issuer(issuer);
                }
                TrustModel::BearerJwt(jwt)
            }
        };
        config = config.with_trust(trust);

        config.validate()?;
        Ok(config)
    }

    /// A copy safe to print: inline secrets are masked, references kept.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.auth.credentials_config = copy.auth.credentials_config.as_deref().map(secret::display);
        copy.server.jwt_secret = copy.server.jwt_secret.as_deref().map(secret::display);
        copy
    }
}
