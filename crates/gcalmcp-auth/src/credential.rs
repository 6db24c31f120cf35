//! Resolved credentials and the scopes they carry.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::store::TokenRecord;

/// An ordered, duplicate-free set of OAuth scope URIs.
///
/// Order is preserved so that scopes written to the token file read back in
/// the order the user granted them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ScopeSet(Vec<String>);

impl ScopeSet {
    /// Builds a scope set, dropping blanks and duplicates.
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for scope in scopes {
            let scope = scope.into().trim().to_string();
            if !scope.is_empty() && !out.contains(&scope) {
                out.push(scope);
            }
        }
        Self(out)
    }

    /// Parses the space-separated `scope` field of a token response.
    pub fn from_space_separated(scopes: &str) -> Self {
        Self::new(scopes.split_whitespace())
    }

    /// Returns true if every scope in `other` is also in `self`.
    pub fn is_superset_of(&self, other: &ScopeSet) -> bool {
        other.0.iter().all(|scope| self.0.contains(scope))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Joins the scopes with single spaces, as OAuth endpoints expect.
    pub fn to_space_separated(&self) -> String {
        self.0.join(" ")
    }
}

impl From<Vec<String>> for ScopeSet {
    fn from(scopes: Vec<String>) -> Self {
        Self::new(scopes)
    }
}

impl From<ScopeSet> for Vec<String> {
    fn from(scopes: ScopeSet) -> Self {
        scopes.0
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_space_separated())
    }
}

/// Where a credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Service-account key supplied inline through configuration.
    EmbeddedConfig,
    /// Service-account key file on disk.
    ServiceAccountFile,
    /// User token loaded from the credential store.
    CachedUserToken,
    /// User token obtained through browser consent.
    InteractiveFlow,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmbeddedConfig => "embedded_config",
            Self::ServiceAccountFile => "service_account_file",
            Self::CachedUserToken => "cached_user_token",
            Self::InteractiveFlow => "interactive_flow",
        }
    }

    /// Returns true for user-delegated sources, whose tokens are persisted.
    pub fn is_user_delegated(&self) -> bool {
        matches!(self, Self::CachedUserToken | Self::InteractiveFlow)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// OAuth client identity attached to user-delegated credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub client_id: String,
    pub client_secret: String,
    pub token_uri: String,
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

/// A bearer credential ready to be attached to calendar requests.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// The bearer token.
    pub access_token: String,
    /// Refresh token, for user-delegated credentials that have one.
    pub refresh_token: Option<String>,
    /// When the access token stops being accepted, if known.
    pub expiry: Option<DateTime<Utc>>,
    /// Scopes the token was granted.
    pub scopes: ScopeSet,
    /// Client identity used to refresh, for user-delegated credentials.
    pub client: Option<ClientIdentity>,
    /// Which acquisition path produced this credential.
    pub source: SourceKind,
}

impl Credential {
    /// Builds a user-delegated credential from a persisted token record.
    pub fn from_record(record: TokenRecord, source: SourceKind) -> Self {
        Self {
            access_token: record.token,
            refresh_token: record.refresh_token,
            expiry: record.expiry,
            scopes: record.scopes,
            client: Some(ClientIdentity {
                client_id: record.client_id,
                client_secret: record.client_secret,
                token_uri: record.token_uri,
            }),
            source,
        }
    }

    /// Converts a user-delegated credential into its persisted form.
    ///
    /// Returns `None` for service-account credentials, which are never stored.
    pub fn to_record(&self) -> Option<TokenRecord> {
        if !self.source.is_user_delegated() {
            return None;
        }
        let client = self.client.as_ref()?;
        Some(TokenRecord {
            token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            token_uri: client.token_uri.clone(),
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
            scopes: self.scopes.clone(),
            expiry: self.expiry,
        })
    }

    /// Returns true if the token is expired, or will be within `skew`.
    ///
    /// A credential without an expiry is treated as valid.
    pub fn is_expired_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expiry.is_some_and(|expiry| now + skew >= expiry)
    }

    pub fn is_refreshable(&self) -> bool {
        self.refresh_token.is_some() && self.client.is_some()
    }

    /// Returns the time until expiry, if known.
    pub fn expires_in(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expiry.map(|expiry| expiry - now)
    }

    /// Returns true if the credential carries every scope in `required`.
    pub fn covers(&self, required: &ScopeSet) -> bool {
        self.scopes.is_superset_of(required)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[redacted]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .field("expiry", &self.expiry)
            .field("scopes", &self.scopes)
            .field("client", &self.client)
            .field("source", &self.source)
            .finish()
    }
}
