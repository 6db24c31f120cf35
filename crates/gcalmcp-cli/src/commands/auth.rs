//! Credential commands.

use chrono::{DateTime, Duration, Utc};
use gcalmcp_auth::{
    Credential, CredentialResolver, CredentialStore, FileTokenStore, ResolverConfig, ScopeSet,
    SourceKind, StoreError,
};
use tracing::info;

use crate::error::{CliError, CliResult};

/// Resolves credentials now, running the consent flow if nothing else works.
///
/// With `force`, the cached user token is treated as rejected: it is
/// refreshed, or replaced through consent if the refresh fails.
pub async fn init(config: ResolverConfig, force: bool) -> CliResult<()> {
    let resolver = CredentialResolver::new(config)?;
    let scopes = ScopeSet::default();

    println!("Resolving Google Calendar credentials...");
    println!("If a browser window opens, approve access to finish.");
    println!();

    let credential = if force {
        resolver.resolve_forced(&scopes, None).await?
    } else {
        resolver.resolve(&scopes).await?
    };

    info!(source = %credential.source, "credentials ready");
    println!("Credentials ready.");
    print_summary(&summarize(&credential, Utc::now()));
    if credential.source.is_user_delegated() {
        println!("  {:<14} {}", "stored in", resolver.store().describe());
    }
    Ok(())
}

/// Reports on the cached user token without touching the network.
pub fn status(config: &ResolverConfig) -> CliResult<()> {
    let store = FileTokenStore::new(&config.token_path);
    let skew = Duration::from_std(config.expiry_skew).unwrap_or(Duration::seconds(60));
    let report = inspect(&store, &config.default_scopes, skew, Utc::now());

    println!("token file: {}", store.path().display());
    match &report {
        TokenStatus::Usable(credential) => {
            println!("Cached token is valid.");
            print_summary(&summarize(credential, Utc::now()));
            Ok(())
        }
        TokenStatus::Refreshable(credential) => {
            println!("Cached token is expired; it will be refreshed on next use.");
            print_summary(&summarize(credential, Utc::now()));
            Ok(())
        }
        unusable => Err(CliError::config(format!(
            "{}; run `gcalmcp auth init` to authorize",
            unusable.reason()
        ))),
    }
}

/// What a cached token is good for.
#[derive(Debug)]
pub enum TokenStatus {
    Missing,
    Unreadable(String),
    MissingScopes { granted: ScopeSet },
    Usable(Credential),
    Refreshable(Credential),
    Expired,
}

impl TokenStatus {
    pub fn reason(&self) -> String {
        match self {
            Self::Missing => "no cached token".to_string(),
            Self::Unreadable(reason) => format!("cached token is unreadable: {}", reason),
            Self::MissingScopes { granted } => {
                format!("cached token lacks required scopes (granted: {})", granted)
            }
            Self::Usable(_) => "cached token is valid".to_string(),
            Self::Refreshable(_) => "cached token is expired but refreshable".to_string(),
            Self::Expired => "cached token is expired and has no refresh token".to_string(),
        }
    }
}

pub fn inspect(
    store: &dyn CredentialStore,
    required: &ScopeSet,
    skew: Duration,
    now: DateTime<Utc>,
) -> TokenStatus {
    let record = match store.load() {
        Ok(record) => record,
        Err(StoreError::NotFound) => return TokenStatus::Missing,
        Err(e) => return TokenStatus::Unreadable(e.to_string()),
    };

    let credential = Credential::from_record(record, SourceKind::CachedUserToken);
    if !credential.covers(required) {
        return TokenStatus::MissingScopes {
            granted: credential.scopes,
        };
    }
    if !credential.is_expired_at(now, skew) {
        TokenStatus::Usable(credential)
    } else if credential.is_refreshable() {
        TokenStatus::Refreshable(credential)
    } else {
        TokenStatus::Expired
    }
}

/// Label/value lines describing a credential. The token itself is reduced to
/// its last four characters.
pub fn summarize(credential: &Credential, now: DateTime<Utc>) -> Vec<(&'static str, String)> {
    let expiry = match (credential.expiry, credential.expires_in(now)) {
        (Some(at), Some(left)) if left > Duration::zero() => {
            format!("{} (in {} min)", at.to_rfc3339(), left.num_minutes())
        }
        (Some(at), _) => format!("{} (expired)", at.to_rfc3339()),
        _ => "unknown".to_string(),
    };

    vec![
        ("source", credential.source.to_string()),
        ("access token", mask(&credential.access_token)),
        ("expires", expiry),
        ("scopes", credential.scopes.to_string()),
        (
            "refresh token",
            (if credential.refresh_token.is_some() { "present" } else { "none" }).to_string(),
        ),
    ]
}

fn mask(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

fn print_summary(lines: &[(&'static str, String)]) {
    for (label, value) in lines {
        println!("  {:<14} {}", label, value);
    }
}
