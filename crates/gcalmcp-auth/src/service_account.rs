//! Service-account keys and self-signed access tokens.
//!
//! Google APIs accept a JWT signed with the service account's private key as
//! a bearer token when it names the requested scopes. Minting one needs no
//! network round trip, so a service-account credential is produced locally
//! and re-minted on every resolution.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credential::{Credential, ScopeSet, SourceKind};
use crate::error::{AuthError, AuthResult};
use crate::oauth::GOOGLE_TOKEN_URL;

/// Lifetime of a minted token. Google rejects self-signed JWTs living longer
/// than one hour.
pub const TOKEN_LIFETIME_SECS: i64 = 3600;

/// A parsed service-account key file.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub key_type: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("project_id", &self.project_id)
            .field("private_key", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    sub: String,
    scope: String,
    iat: i64,
    exp: i64,
}

impl ServiceAccountKey {
    /// Parses a key from its JSON document.
    pub fn from_json(json: &str) -> AuthResult<Self> {
        let key: Self = serde_json::from_str(json).map_err(|e| {
            AuthError::config_invalid("service account key is not valid JSON").with_source(e)
        })?;
        if key.key_type != "service_account" {
            return Err(AuthError::config_invalid(format!(
                "expected a service_account key, found type '{}'",
                key.key_type
            )));
        }
        Ok(key)
    }

    /// Parses a key supplied inline through configuration.
    ///
    /// The payload is normally base64 of the key JSON; raw JSON is accepted
    /// as well.
    pub fn from_embedded(payload: &str) -> AuthResult<Self> {
        let payload = payload.trim();
        if payload.is_empty() {
            return Err(AuthError::config_missing("embedded credentials are empty"));
        }
        if payload.starts_with('{') {
            return Self::from_json(payload);
        }

        let compact: String = payload.split_whitespace().collect();
        let bytes = STANDARD
            .decode(&compact)
            .or_else(|_| URL_SAFE.decode(&compact))
            .map_err(|e| {
                AuthError::config_invalid("embedded credentials are not valid base64")
                    .with_source(e)
            })?;
        let json = String::from_utf8(bytes).map_err(|e| {
            AuthError::config_invalid("embedded credentials are not UTF-8").with_source(e)
        })?;
        Self::from_json(&json)
    }

    /// Reads a key file from disk.
    pub fn from_file(path: &Path) -> AuthResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                AuthError::config_missing("service account file not found")
            } else {
                AuthError::config_invalid("service account file is unreadable").with_source(e)
            }
        })?;
        debug!("read service account key from {:?}", path);
        Self::from_json(&content)
    }

    /// Mints a bearer token for `scopes`, valid from `now` for one hour.
    pub fn mint(
        &self,
        scopes: &ScopeSet,
        source: SourceKind,
        now: DateTime<Utc>,
    ) -> AuthResult<Credential> {
        let encoding_key = EncodingKey::from_rsa_pem(self.private_key.as_bytes()).map_err(|e| {
            AuthError::config_invalid("service account private key is not a valid RSA PEM")
                .with_source(e)
        })?;

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        let iat = now.timestamp();
        let exp = iat + TOKEN_LIFETIME_SECS;
        let claims = Claims {
            iss: self.client_email.clone(),
            sub: self.client_email.clone(),
            scope: scopes.to_space_separated(),
            iat,
            exp,
        };

        let token = jsonwebtoken::encode(&header, &claims, &encoding_key).map_err(|e| {
            AuthError::config_invalid("failed to sign service account token").with_source(e)
        })?;

        Ok(Credential {
            access_token: token,
            refresh_token: None,
            expiry: Some(now + Duration::seconds(TOKEN_LIFETIME_SECS)),
            scopes: scopes.clone(),
            client: None,
            source,
        })
    }
}
