//! Persistent storage for user-delegated tokens.
//!
//! The on-disk format is the authorized-user JSON document that Google's own
//! client libraries read and write, so a token created by other tooling can be
//! picked up as is:
//!
//! ```json
//! {
//!   "token": "ya29...",
//!   "refresh_token": "1//...",
//!   "token_uri": "https://oauth2.googleapis.com/token",
//!   "client_id": "....apps.googleusercontent.com",
//!   "client_secret": "...",
//!   "scopes": ["https://www.googleapis.com/auth/calendar"],
//!   "expiry": "2025-02-05T10:00:00.123456Z"
//! }
//! ```

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::credential::ScopeSet;
use crate::oauth::GOOGLE_TOKEN_URL;

/// A persisted user-delegated token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// The access token.
    pub token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default = "default_token_uri")]
    pub token_uri: String,

    pub client_id: String,

    pub client_secret: String,

    #[serde(default)]
    pub scopes: ScopeSet,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "expiry_format")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("token", &"[redacted]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("scopes", &self.scopes)
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Expiry timestamps as RFC 3339.
///
/// Files written by the Python client libraries carry a naive ISO timestamp
/// with no offset; those are read as UTC.
mod expiry_format {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        parse(&raw).map(Some).map_err(D::Error::custom)
    }

    pub(super) fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| format!("invalid expiry timestamp '{}': {}", raw, e))
    }
}

/// Errors from a [`CredentialStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record has been saved yet.
    #[error("no token record found")]
    NotFound,

    /// A record exists but cannot be read or parsed.
    #[error("token record is unreadable: {reason}")]
    Corrupt { reason: String },

    /// The record could not be written.
    #[error("failed to write token record: {reason}")]
    Write { reason: String },
}

/// Durable storage for one user-delegated token record.
///
/// Implementations must make `save` atomic: a concurrent `load` sees either
/// the previous record or the new one, never a partial write.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<TokenRecord, StoreError>;

    fn save(&self, record: &TokenRecord) -> Result<(), StoreError>;

    /// A short description of where records live, for diagnostics.
    fn describe(&self) -> String;
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A [`CredentialStore`] backed by a single JSON file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "token.json".to_string());
        let unique = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_name = format!(".{}.{}.{}.tmp", file_name, std::process::id(), unique);
        self.path.with_file_name(temp_name)
    }

    fn write_temp(path: &Path, content: &[u8]) -> io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        file.write_all(content)?;
        file.sync_all()
    }
}

impl CredentialStore for FileTokenStore {
    fn load(&self) -> Result<TokenRecord, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no token file at {:?}", self.path);
                return Err(StoreError::NotFound);
            }
            Err(e) => {
                return Err(StoreError::Corrupt {
                    reason: e.to_string(),
                });
            }
        };

        let record = serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            reason: e.to_string(),
        })?;
        debug!("loaded token record from {:?}", self.path);
        Ok(record)
    }

    fn save(&self, record: &TokenRecord) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| StoreError::Write {
                reason: format!("failed to create token directory: {}", e),
            })?;
        }

        let content = serde_json::to_vec_pretty(record).map_err(|e| StoreError::Write {
            reason: format!("failed to serialize token record: {}", e),
        })?;

        // Write a sibling temp file, then rename over the target.
        let temp_path = self.temp_path();
        if let Err(e) = Self::write_temp(&temp_path, &content) {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::Write {
                reason: e.to_string(),
            });
        }
        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::Write {
                reason: e.to_string(),
            });
        }

        info!("saved token record to {:?}", self.path);
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
