//! Server configuration.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use gcalmcp_calendar::DEFAULT_CALENDAR_ID;

use crate::error::{ServerError, ServerResult};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8002;

/// How inbound requests are authenticated. A deployment picks exactly one.
#[derive(Clone, PartialEq, Eq)]
pub enum TrustModel {
    /// No gate; rely on the network boundary.
    None,
    /// HS256 bearer JWT on every calendar route.
    BearerJwt(JwtSettings),
}

impl TrustModel {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::BearerJwt(_) => "bearer-jwt",
        }
    }
}

impl fmt::Debug for TrustModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::BearerJwt(settings) => f.debug_tuple("BearerJwt").field(settings).finish(),
        }
    }
}

/// Names accepted on the command line and in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrustModelKind {
    #[default]
    None,
    BearerJwt,
}

impl FromStr for TrustModelKind {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "bearer-jwt" | "jwt" => Ok(Self::BearerJwt),
            other => Err(ServerError::config(format!(
                "unknown trust model '{}' (expected none or bearer-jwt)",
                other
            ))),
        }
    }
}

/// Shared-secret JWT validation settings.
#[derive(Clone, PartialEq, Eq)]
pub struct JwtSettings {
    pub secret: String,
    pub audience: Option<String>,
    pub issuer: Option<String>,
}

impl JwtSettings {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            audience: None,
            issuer: None,
        }
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }
}

impl fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret", &"[redacted]")
            .field("audience", &self.audience)
            .field("issuer", &self.issuer)
            .finish()
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: IpAddr,

    /// Port to bind.
    pub port: u16,

    /// Calendar all routes operate on.
    pub calendar_id: String,

    /// Timeout for calendar API calls.
    pub http_timeout: Duration,

    /// Inbound authentication.
    pub trust: TrustModel,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
            calendar_id: DEFAULT_CALENDAR_ID.to_string(),
            http_timeout: Duration::from_secs(30),
            trust: TrustModel::None,
        }
    }
}

impl ServerConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            host,
            port,
            ..Default::default()
        }
    }

    /// Builder: set calendar id.
    pub fn with_calendar_id(mut self, calendar_id: impl Into<String>) -> Self {
        self.calendar_id = calendar_id.into();
        self
    }

    /// Builder: set calendar API timeout.
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Builder: set trust model.
    pub fn with_trust(mut self, trust: TrustModel) -> Self {
        self.trust = trust;
        self
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.calendar_id.trim().is_empty() {
            return Err(ServerError::config("calendar id cannot be empty"));
        }
        if self.http_timeout.is_zero() {
            return Err(ServerError::config("http timeout must be positive"));
        }
        if let TrustModel::BearerJwt(settings) = &self.trust
            && settings.secret.trim().is_empty()
        {
            return Err(ServerError::config(
                "bearer-jwt trust model requires a JWT secret",
            ));
        }
        Ok(())
    }
}
