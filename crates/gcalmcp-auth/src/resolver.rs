//! Layered credential resolution.
//!
//! [`CredentialResolver::resolve`] walks an ordered list of acquisition
//! strategies and returns the first credential that is valid for the
//! requested scopes:
//!
//! 1. embedded service-account key
//! 2. service-account key file
//! 3. cached user token, refreshed once if expired
//! 4. interactive browser consent
//!
//! A failing source is logged and skipped. Only the interactive flow is
//! fatal: when it fails the caller gets `authentication_failed`.
//!
//! # Concurrency
//!
//! The last good user credential is kept in memory behind an `RwLock`, so the
//! common path never touches the store. Refresh runs under a mutex and
//! re-checks the cache once the lock is held. Interactive authorization is
//! single-flight: it runs in a detached task that publishes its result on a
//! `watch` channel, every concurrent caller waits on the same channel, and a
//! caller that goes away does not cancel the flow.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::{Mutex, RwLock, watch};
use tracing::{debug, info, warn};
use url::Url;

use crate::client_secret::ClientSecret;
use crate::config::ResolverConfig;
use crate::credential::{ClientIdentity, Credential, ScopeSet, SourceKind};
use crate::error::{AuthError, AuthErrorCode, AuthResult};
use crate::oauth::{
    HttpTokenEndpoint, InteractiveAuthorizer, LoopbackAuthorizer, RefreshRequest, TokenEndpoint,
    TokenGrant,
};
use crate::service_account::ServiceAccountKey;
use crate::store::{CredentialStore, FileTokenStore, StoreError};

/// One way of obtaining a credential, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionStrategy {
    EmbeddedConfig,
    ServiceAccountFile,
    CachedUserToken,
    InteractiveFlow,
}

impl AcquisitionStrategy {
    /// Priority order. The last entry is the only fatal one.
    pub const ORDER: [Self; 4] = [
        Self::EmbeddedConfig,
        Self::ServiceAccountFile,
        Self::CachedUserToken,
        Self::InteractiveFlow,
    ];

    pub fn source_kind(self) -> SourceKind {
        match self {
            Self::EmbeddedConfig => SourceKind::EmbeddedConfig,
            Self::ServiceAccountFile => SourceKind::ServiceAccountFile,
            Self::CachedUserToken => SourceKind::CachedUserToken,
            Self::InteractiveFlow => SourceKind::InteractiveFlow,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode<'a> {
    Normal,
    /// The provider rejected a token: the given one, or whatever is cached
    /// when `None`.
    Forced(Option<&'a str>),
}

type InteractiveOutcome = Option<AuthResult<Credential>>;

struct InFlight {
    scopes: ScopeSet,
    rx: watch::Receiver<InteractiveOutcome>,
}

enum FlightStep {
    Join(watch::Receiver<InteractiveOutcome>),
    /// A flow for other scopes holds the redirect port; wait for it first.
    WaitThenRetry(watch::Receiver<InteractiveOutcome>),
}

struct Inner {
    config: ResolverConfig,
    redirect: Url,
    store: Arc<dyn CredentialStore>,
    token_endpoint: Arc<dyn TokenEndpoint>,
    authorizer: Arc<dyn InteractiveAuthorizer>,
    cache: RwLock<Option<Credential>>,
    refresh_lock: Mutex<()>,
    interactive: Mutex<Option<InFlight>>,
}

/// Produces valid credentials from the configured sources.
///
/// Cheap to clone; clones share the cache and any in-flight authorization.
#[derive(Clone)]
pub struct CredentialResolver {
    inner: Arc<Inner>,
}

impl CredentialResolver {
    /// Creates a resolver backed by the token file, Google's token endpoint
    /// and the loopback consent flow.
    pub fn new(config: ResolverConfig) -> AuthResult<Self> {
        config.validate()?;
        let store = Arc::new(FileTokenStore::new(&config.token_path));
        let token_endpoint = Arc::new(HttpTokenEndpoint::new(config.http_timeout)?);
        let authorizer = Arc::new(
            LoopbackAuthorizer::new(config.redirect_url()?, config.http_timeout)?
                .with_open_browser(config.open_browser),
        );
        Self::from_parts(config, store, token_endpoint, authorizer)
    }

    /// Creates a resolver from explicit collaborators.
    pub fn from_parts(
        config: ResolverConfig,
        store: Arc<dyn CredentialStore>,
        token_endpoint: Arc<dyn TokenEndpoint>,
        authorizer: Arc<dyn InteractiveAuthorizer>,
    ) -> AuthResult<Self> {
        config.validate()?;
        let redirect = config.redirect_url()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                redirect,
                store,
                token_endpoint,
                authorizer,
                cache: RwLock::new(None),
                refresh_lock: Mutex::new(()),
                interactive: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &dyn CredentialStore {
        self.inner.store.as_ref()
    }

    /// Returns a credential valid for `scopes`. An empty set means the
    /// configured default scopes.
    pub async fn resolve(&self, scopes: &ScopeSet) -> AuthResult<Credential> {
        self.resolve_with(scopes, Mode::Normal).await
    }

    /// Like [`resolve`](Self::resolve), but the user token `rejected` is not
    /// handed out again: it is refreshed, or replaced if refresh fails. A
    /// different valid token, e.g. one a concurrent caller already refreshed,
    /// is returned as is.
    ///
    /// With `rejected` set to `None` the currently cached token is treated as
    /// rejected.
    pub async fn resolve_forced(
        &self,
        scopes: &ScopeSet,
        rejected: Option<&str>,
    ) -> AuthResult<Credential> {
        self.resolve_with(scopes, Mode::Forced(rejected)).await
    }

    async fn resolve_with(&self, scopes: &ScopeSet, mode: Mode<'_>) -> AuthResult<Credential> {
        let requested = if scopes.is_empty() {
            self.inner.config.default_scopes.clone()
        } else {
            scopes.clone()
        };

        for strategy in AcquisitionStrategy::ORDER {
            let attempt = match strategy {
                AcquisitionStrategy::EmbeddedConfig => self.from_embedded(&requested),
                AcquisitionStrategy::ServiceAccountFile => self.from_service_account_file(&requested),
                AcquisitionStrategy::CachedUserToken => {
                    self.from_cached_user_token(&requested, mode).await
                }
                AcquisitionStrategy::InteractiveFlow => self.from_interactive_flow(&requested).await,
            };

            match attempt {
                Ok(credential) => {
                    debug!(
                        source = %credential.source,
                        forced = mode != Mode::Normal,
                        "resolved credential"
                    );
                    return Ok(credential);
                }
                Err(err) if strategy == AcquisitionStrategy::InteractiveFlow => {
                    warn!(error = %err, "interactive authorization failed");
                    return Err(AuthError::authentication_failed(format!(
                        "no usable credentials: {}",
                        err.message()
                    ))
                    .with_source(err));
                }
                Err(err) if err.code() == AuthErrorCode::ConfigMissing => {
                    debug!(source = %strategy.source_kind(), reason = %err, "credential source not available");
                }
                Err(err) => {
                    warn!(source = %strategy.source_kind(), error = %err, "credential source failed, trying next");
                }
            }
        }

        Err(AuthError::authentication_failed(
            "no credential source succeeded",
        ))
    }

    fn from_embedded(&self, scopes: &ScopeSet) -> AuthResult<Credential> {
        let Some(payload) = self.inner.config.embedded_credentials.as_deref() else {
            return Err(AuthError::config_missing("no embedded credentials configured"));
        };
        ServiceAccountKey::from_embedded(payload)?.mint(scopes, SourceKind::EmbeddedConfig, Utc::now())
    }

    fn from_service_account_file(&self, scopes: &ScopeSet) -> AuthResult<Credential> {
        let Some(path) = self.inner.config.service_account_path.as_deref() else {
            return Err(AuthError::config_missing("no service account file configured"));
        };
        ServiceAccountKey::from_file(path)?.mint(scopes, SourceKind::ServiceAccountFile, Utc::now())
    }

    async fn from_cached_user_token(&self, scopes: &ScopeSet, mode: Mode<'_>) -> AuthResult<Credential> {
        let observed = self.inner.cache.read().await.clone();
        let is_rejected = |token: &str| match mode {
            Mode::Normal => false,
            Mode::Forced(Some(rejected)) => token == rejected,
            Mode::Forced(None) => observed
                .as_ref()
                .is_none_or(|seen| seen.access_token == token),
        };

        if let Some(cached) = &observed
            && !is_rejected(&cached.access_token)
            && self.inner.usable(cached, scopes, Utc::now())
        {
            return Ok(cached.clone());
        }

        let _guard = self.inner.refresh_lock.lock().await;

        // A peer may have refreshed or re-authorized while we waited.
        if let Some(cached) = self.inner.cache.read().await.as_ref()
            && !is_rejected(&cached.access_token)
            && self.inner.usable(cached, scopes, Utc::now())
        {
            return Ok(cached.clone());
        }

        let record = match self.inner.store.load() {
            Ok(record) => record,
            Err(StoreError::NotFound) => {
                return Err(AuthError::config_missing("no cached user token"));
            }
            Err(e) => {
                return Err(
                    AuthError::config_invalid("cached user token is unreadable").with_source(e)
                );
            }
        };

        let mut credential = Credential::from_record(record, SourceKind::CachedUserToken);
        if !credential.covers(scopes) {
            return Err(AuthError::authentication_failed(
                "cached user token does not cover the requested scopes",
            ));
        }

        let rejected = is_rejected(&credential.access_token);
        if !rejected && !credential.is_expired_at(Utc::now(), self.inner.skew()) {
            *self.inner.cache.write().await = Some(credential.clone());
            return Ok(credential);
        }

        let (Some(client), Some(refresh_token)) =
            (credential.client.clone(), credential.refresh_token.clone())
        else {
            return Err(AuthError::authentication_failed(
                "cached user token is expired and has no refresh token",
            ));
        };

        debug!(forced = rejected, "refreshing cached user token");
        let grant = self
            .inner
            .token_endpoint
            .refresh(RefreshRequest {
                token_uri: &client.token_uri,
                client_id: &client.client_id,
                client_secret: &client.client_secret,
                refresh_token: &refresh_token,
            })
            .await?;

        let now = Utc::now();
        apply_refresh(&mut credential, grant, now);
        if credential.is_expired_at(now, self.inner.skew()) {
            return Err(AuthError::authentication_failed(
                "refreshed token is already expired",
            ));
        }

        self.inner.persist(&credential);
        *self.inner.cache.write().await = Some(credential.clone());
        info!("refreshed cached user token");
        Ok(credential)
    }

    async fn from_interactive_flow(&self, scopes: &ScopeSet) -> AuthResult<Credential> {
        let client = ClientSecret::from_file(&self.inner.config.client_secret_path)?;
        client.check_redirect(&self.inner.redirect)?;

        loop {
            let step = {
                let mut slot = self.inner.interactive.lock().await;
                let running = slot
                    .as_ref()
                    .filter(|flight| flight.rx.borrow().is_none())
                    .map(|flight| (flight.scopes.is_superset_of(scopes), flight.rx.clone()));
                match running {
                    Some((true, rx)) => {
                        debug!("joining interactive authorization already in progress");
                        FlightStep::Join(rx)
                    }
                    Some((false, rx)) => FlightStep::WaitThenRetry(rx),
                    None => {
                        let rx = Arc::clone(&self.inner).spawn_interactive(client.clone(), scopes.clone());
                        *slot = Some(InFlight {
                            scopes: scopes.clone(),
                            rx: rx.clone(),
                        });
                        FlightStep::Join(rx)
                    }
                }
            };

            match step {
                FlightStep::Join(mut rx) => {
                    let outcome = rx
                        .wait_for(Option::is_some)
                        .await
                        .map(|published| (*published).clone())
                        .map_err(|_| {
                            AuthError::authentication_failed(
                                "interactive authorization ended without a result",
                            )
                        })?;
                    return outcome.unwrap_or_else(|| {
                        Err(AuthError::authentication_failed(
                            "interactive authorization ended without a result",
                        ))
                    });
                }
                FlightStep::WaitThenRetry(mut rx) => {
                    debug!("waiting for interactive authorization with other scopes to finish");
                    let _ = rx.wait_for(Option::is_some).await;
                }
            }
        }
    }
}

impl Inner {
    fn skew(&self) -> ChronoDuration {
        ChronoDuration::from_std(self.config.expiry_skew).unwrap_or(ChronoDuration::seconds(60))
    }

    fn usable(&self, credential: &Credential, scopes: &ScopeSet, now: DateTime<Utc>) -> bool {
        credential.covers(scopes) && !credential.is_expired_at(now, self.skew())
    }

    /// Saves a user credential. A failed write is logged; the credential is
    /// still good for this process.
    fn persist(&self, credential: &Credential) {
        let Some(record) = credential.to_record() else {
            return;
        };
        if let Err(e) = self.store.save(&record) {
            warn!(error = %e, store = %self.store.describe(), "failed to persist user token");
        }
    }

    fn spawn_interactive(
        self: Arc<Self>,
        client: ClientSecret,
        scopes: ScopeSet,
    ) -> watch::Receiver<InteractiveOutcome> {
        let (tx, rx) = watch::channel(None);
        tokio::spawn(async move {
            let outcome = self.run_interactive(&client, &scopes).await;
            tx.send_replace(Some(outcome));
        });
        rx
    }

    async fn run_interactive(&self, client: &ClientSecret, scopes: &ScopeSet) -> AuthResult<Credential> {
        info!(
            timeout_secs = self.config.interactive_timeout.as_secs(),
            scopes = %scopes,
            "starting interactive authorization"
        );
        let grant = tokio::time::timeout(
            self.config.interactive_timeout,
            self.authorizer.authorize(client, scopes),
        )
        .await
        .map_err(|_| AuthError::authentication_failed("interactive authorization timed out"))??;

        let now = Utc::now();
        let granted = grant.granted_scopes().unwrap_or_else(|| scopes.clone());
        let credential = Credential {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expiry: grant.expires_in.map(|secs| now + ChronoDuration::seconds(secs)),
            scopes: granted,
            client: Some(ClientIdentity {
                client_id: client.client_id.clone(),
                client_secret: client.client_secret.clone(),
                token_uri: client.token_uri.clone(),
            }),
            source: SourceKind::InteractiveFlow,
        };

        if !credential.covers(scopes) {
            return Err(AuthError::authentication_failed(
                "consent granted fewer scopes than requested",
            ));
        }
        if credential.is_expired_at(now, self.skew()) {
            return Err(AuthError::authentication_failed(
                "authorized token is already expired",
            ));
        }

        let _guard = self.refresh_lock.lock().await;
        self.persist(&credential);
        *self.cache.write().await = Some(credential.clone());
        info!(
            refreshable = credential.is_refreshable(),
            "interactive authorization complete"
        );
        Ok(credential)
    }
}

/// Applies a refresh grant, keeping the old refresh token unless the
/// provider rotated it.
fn apply_refresh(credential: &mut Credential, grant: TokenGrant, now: DateTime<Utc>) {
    credential.access_token = grant.access_token;
    credential.expiry = grant
        .expires_in
        .map(|secs| now + ChronoDuration::seconds(secs));
    if let Some(rotated) = grant.refresh_token {
        credential.refresh_token = Some(rotated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::BoxFuture;
    use crate::store::TokenRecord;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    const KEY_JSON: &str = include_str!("../testdata/service_account.json");
    const CALENDAR: &str = "https://www.googleapis.com/auth/calendar";
    const READONLY: &str = "https://www.googleapis.com/auth/calendar.readonly";
    const CLIENT_SECRET_JSON: &str = r#"{
        "installed": {
            "client_id": "test-id.apps.googleusercontent.com",
            "client_secret": "test-secret",
            "redirect_uris": ["http://localhost"]
        }
    }"#;

    #[derive(Default)]
    struct MemoryStore {
        record: std::sync::Mutex<Option<TokenRecord>>,
        corrupt: bool,
        loads: AtomicUsize,
        saves: AtomicUsize,
    }

    impl MemoryStore {
        fn with_record(record: TokenRecord) -> Self {
            let store = Self::default();
            *store.record.lock().unwrap() = Some(record);
            store
        }

        fn corrupt() -> Self {
            Self {
                corrupt: true,
                ..Self::default()
            }
        }

        fn current(&self) -> Option<TokenRecord> {
            self.record.lock().unwrap().clone()
        }
    }

    impl CredentialStore for MemoryStore {
        fn load(&self) -> Result<TokenRecord, StoreError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.corrupt {
                return Err(StoreError::Corrupt {
                    reason: "expected value at line 1 column 1".to_string(),
                });
            }
            self.record.lock().unwrap().clone().ok_or(StoreError::NotFound)
        }

        fn save(&self, record: &TokenRecord) -> Result<(), StoreError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.record.lock().unwrap() = Some(record.clone());
            Ok(())
        }

        fn describe(&self) -> String {
            "memory".to_string()
        }
    }

    struct FakeEndpoint {
        calls: AtomicUsize,
        result: AuthResult<TokenGrant>,
    }

    impl TokenEndpoint for FakeEndpoint {
        fn refresh<'a>(&'a self, _request: RefreshRequest<'a>) -> BoxFuture<'a, AuthResult<TokenGrant>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.result.clone()
            })
        }
    }

    struct FakeAuthorizer {
        calls: AtomicUsize,
        delay: Duration,
        result: AuthResult<TokenGrant>,
    }

    impl InteractiveAuthorizer for FakeAuthorizer {
        fn authorize<'a>(
            &'a self,
            _client: &'a ClientSecret,
            _scopes: &'a ScopeSet,
        ) -> BoxFuture<'a, AuthResult<TokenGrant>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(self.delay).await;
                self.result.clone()
            })
        }
    }

    fn grant(token: &str, refresh_token: Option<&str>) -> TokenGrant {
        TokenGrant {
            access_token: token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expires_in: Some(3599),
            scope: None,
            token_type: Some("Bearer".to_string()),
        }
    }

    fn user_record(token: &str, expiry: DateTime<Utc>, refresh_token: Option<&str>) -> TokenRecord {
        TokenRecord {
            token: token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            client_id: "test-id.apps.googleusercontent.com".to_string(),
            client_secret: "test-secret".to_string(),
            scopes: ScopeSet::new([CALENDAR]),
            expiry: Some(expiry),
        }
    }

    fn calendar() -> ScopeSet {
        ScopeSet::new([CALENDAR])
    }

    struct Harness {
        dir: TempDir,
        store: Arc<MemoryStore>,
        endpoint: Arc<FakeEndpoint>,
        authorizer: Arc<FakeAuthorizer>,
    }

    impl Harness {
        fn new(store: MemoryStore) -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                store: Arc::new(store),
                endpoint: Arc::new(FakeEndpoint {
                    calls: AtomicUsize::new(0),
                    result: Ok(grant("ya29.refreshed", None)),
                }),
                authorizer: Arc::new(FakeAuthorizer {
                    calls: AtomicUsize::new(0),
                    delay: Duration::from_millis(50),
                    result: Ok(grant("ya29.interactive", Some("1//interactive"))),
                }),
            }
        }

        fn with_endpoint_result(mut self, result: AuthResult<TokenGrant>) -> Self {
            self.endpoint = Arc::new(FakeEndpoint {
                calls: AtomicUsize::new(0),
                result,
            });
            self
        }

        fn with_authorizer(mut self, delay: Duration, result: AuthResult<TokenGrant>) -> Self {
            self.authorizer = Arc::new(FakeAuthorizer {
                calls: AtomicUsize::new(0),
                delay,
                result,
            });
            self
        }

        fn with_client_secret(self) -> Self {
            std::fs::write(self.dir.path().join("credentials.json"), CLIENT_SECRET_JSON).unwrap();
            self
        }

        fn config(&self) -> ResolverConfig {
            ResolverConfig::new(self.dir.path()).with_service_account_path(None)
        }

        fn resolver(&self) -> CredentialResolver {
            self.resolver_with(self.config())
        }

        fn resolver_with(&self, config: ResolverConfig) -> CredentialResolver {
            CredentialResolver::from_parts(
                config,
                self.store.clone(),
                self.endpoint.clone(),
                self.authorizer.clone(),
            )
            .unwrap()
        }

        fn refreshes(&self) -> usize {
            self.endpoint.calls.load(Ordering::SeqCst)
        }

        fn authorizations(&self) -> usize {
            self.authorizer.calls.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn embedded_config_wins_without_store_io() {
        let future = Utc::now() + ChronoDuration::hours(1);
        let harness = Harness::new(MemoryStore::with_record(user_record("ya29.cached", future, None)));
        let config = harness
            .config()
            .with_embedded_credentials(STANDARD.encode(KEY_JSON));

        let credential = harness.resolver_with(config).resolve(&calendar()).await.unwrap();

        assert_eq!(credential.source, SourceKind::EmbeddedConfig);
        assert!(credential.expiry.unwrap() > Utc::now());
        assert_eq!(harness.store.loads.load(Ordering::SeqCst), 0);
        assert_eq!(harness.store.saves.load(Ordering::SeqCst), 0);
        assert_eq!(harness.refreshes(), 0);
    }

    #[tokio::test]
    async fn invalid_embedded_config_falls_through_to_key_file() {
        let harness = Harness::new(MemoryStore::default());
        let key_path = harness.dir.path().join("service_account.json");
        std::fs::write(&key_path, KEY_JSON).unwrap();
        let config = harness
            .config()
            .with_embedded_credentials("definitely not base64!")
            .with_service_account_path(Some(key_path));

        let credential = harness.resolver_with(config).resolve(&calendar()).await.unwrap();

        assert_eq!(credential.source, SourceKind::ServiceAccountFile);
        assert_eq!(harness.store.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn valid_cached_token_is_reused_without_second_load() {
        let future = Utc::now() + ChronoDuration::hours(1);
        let harness = Harness::new(MemoryStore::with_record(user_record("ya29.cached", future, Some("1//r"))));
        let resolver = harness.resolver();

        let first = resolver.resolve(&calendar()).await.unwrap();
        let second = resolver.resolve(&ScopeSet::default()).await.unwrap();

        assert_eq!(first.access_token, "ya29.cached");
        assert_eq!(second.access_token, first.access_token);
        assert_eq!(first.source, SourceKind::CachedUserToken);
        assert_eq!(harness.store.loads.load(Ordering::SeqCst), 1);
        assert_eq!(harness.refreshes(), 0);
    }

    #[tokio::test]
    async fn cached_token_with_narrower_scopes_is_skipped() {
        let future = Utc::now() + ChronoDuration::hours(1);
        let mut record = user_record("ya29.readonly", future, Some("1//r"));
        record.scopes = ScopeSet::new([READONLY]);
        let harness = Harness::new(MemoryStore::with_record(record)).with_client_secret();

        let credential = harness
            .resolver()
            .resolve(&ScopeSet::new([READONLY, CALENDAR]))
            .await
            .unwrap();

        assert_eq!(credential.source, SourceKind::InteractiveFlow);
        assert_eq!(credential.access_token, "ya29.interactive");
        assert_eq!(harness.refreshes(), 0);
        assert_eq!(harness.authorizations(), 1);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_once_and_persisted() {
        let expired = Utc::now() - ChronoDuration::minutes(10);
        let harness = Harness::new(MemoryStore::with_record(user_record("ya29.old", expired, Some("1//keep"))));

        let credential = harness.resolver().resolve(&calendar()).await.unwrap();

        assert_eq!(credential.source, SourceKind::CachedUserToken);
        assert_eq!(credential.access_token, "ya29.refreshed");
        assert!(credential.expiry.unwrap() > Utc::now());
        assert_eq!(harness.refreshes(), 1);

        let saved = harness.store.current().unwrap();
        assert_eq!(harness.store.saves.load(Ordering::SeqCst), 1);
        assert_eq!(saved.token, "ya29.refreshed");
        assert_eq!(saved.refresh_token.as_deref(), Some("1//keep"));
        assert!(saved.expiry.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn refresh_failure_falls_through_to_interactive() {
        let expired = Utc::now() - ChronoDuration::minutes(10);
        let harness = Harness::new(MemoryStore::with_record(user_record("ya29.old", expired, Some("1//r"))))
            .with_endpoint_result(Err(AuthError::authentication_failed("invalid_grant")))
            .with_client_secret();

        let credential = harness.resolver().resolve(&calendar()).await.unwrap();

        assert_eq!(credential.source, SourceKind::InteractiveFlow);
        assert_eq!(harness.refreshes(), 1);
        assert_eq!(harness.authorizations(), 1);
        assert_eq!(harness.store.current().unwrap().token, "ya29.interactive");
    }

    #[tokio::test]
    async fn expired_without_refresh_token_skips_network() {
        let expired = Utc::now() - ChronoDuration::minutes(10);
        let harness = Harness::new(MemoryStore::with_record(user_record("ya29.old", expired, None)));

        let err = harness.resolver().resolve(&calendar()).await.unwrap_err();

        assert_eq!(err.code(), AuthErrorCode::AuthenticationFailed);
        assert_eq!(harness.refreshes(), 0);
        assert_eq!(harness.authorizations(), 0);
    }

    #[tokio::test]
    async fn nothing_configured_fails_without_network() {
        let harness = Harness::new(MemoryStore::default());

        let err = harness.resolver().resolve(&calendar()).await.unwrap_err();

        assert_eq!(err.code(), AuthErrorCode::AuthenticationFailed);
        assert_eq!(harness.refreshes(), 0);
        assert_eq!(harness.authorizations(), 0);
        assert_eq!(harness.store.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_resolves_share_one_interactive_flow() {
        let harness = Harness::new(MemoryStore::default())
            .with_authorizer(Duration::from_millis(100), Ok(grant("ya29.shared", Some("1//r"))))
            .with_client_secret();
        let resolver = harness.resolver();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let resolver = resolver.clone();
                tokio::spawn(async move { resolver.resolve(&calendar()).await })
            })
            .collect();

        for handle in handles {
            let credential = handle.await.unwrap().unwrap();
            assert_eq!(credential.access_token, "ya29.shared");
        }
        assert_eq!(harness.authorizations(), 1);
        assert_eq!(harness.store.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_waiters_share_the_failure() {
        let harness = Harness::new(MemoryStore::default())
            .with_authorizer(
                Duration::from_millis(100),
                Err(AuthError::authentication_failed("authorization denied: access_denied")),
            )
            .with_client_secret();
        let resolver = harness.resolver();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let resolver = resolver.clone();
                tokio::spawn(async move { resolver.resolve(&calendar()).await })
            })
            .collect();

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert_eq!(err.code(), AuthErrorCode::AuthenticationFailed);
            assert!(err.message().contains("access_denied"));
        }
        assert_eq!(harness.authorizations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn interactive_flow_times_out() {
        let harness = Harness::new(MemoryStore::default())
            .with_authorizer(Duration::from_secs(3600), Ok(grant("ya29.late", None)))
            .with_client_secret();
        let config = harness
            .config()
            .with_interactive_timeout(Duration::from_secs(5));

        let err = harness.resolver_with(config).resolve(&calendar()).await.unwrap_err();

        assert_eq!(err.code(), AuthErrorCode::AuthenticationFailed);
        assert!(err.message().contains("timed out"));
        assert_eq!(harness.store.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dropped_caller_does_not_cancel_authorization() {
        let harness = Harness::new(MemoryStore::default())
            .with_authorizer(Duration::from_millis(100), Ok(grant("ya29.kept", Some("1//r"))))
            .with_client_secret();
        let resolver = harness.resolver();

        let abandoned = {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.resolve(&calendar()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        abandoned.abort();

        let credential = resolver.resolve(&calendar()).await.unwrap();
        assert_eq!(credential.access_token, "ya29.kept");
        assert_eq!(harness.authorizations(), 1);
        assert_eq!(harness.store.current().unwrap().token, "ya29.kept");
    }

    #[tokio::test]
    async fn forced_resolution_refreshes_valid_token() {
        let future = Utc::now() + ChronoDuration::hours(1);
        let harness = Harness::new(MemoryStore::with_record(user_record("ya29.cached", future, Some("1//r"))));
        let resolver = harness.resolver();

        let first = resolver.resolve(&calendar()).await.unwrap();
        let forced = resolver
            .resolve_forced(&calendar(), Some(&first.access_token))
            .await
            .unwrap();
        let after = resolver.resolve(&calendar()).await.unwrap();

        assert_eq!(first.access_token, "ya29.cached");
        assert_eq!(forced.access_token, "ya29.refreshed");
        assert_eq!(after.access_token, "ya29.refreshed");
        assert_eq!(harness.refreshes(), 1);
    }

    #[tokio::test]
    async fn forced_resolutions_of_same_rejected_token_refresh_once() {
        let future = Utc::now() + ChronoDuration::hours(1);
        let harness = Harness::new(MemoryStore::with_record(user_record("ya29.cached", future, Some("1//r"))));
        let resolver = harness.resolver();

        let first = resolver.resolve(&calendar()).await.unwrap();
        let second = resolver.resolve(&calendar()).await.unwrap();
        assert_eq!(first.access_token, second.access_token);

        let retry_a = resolver
            .resolve_forced(&calendar(), Some(&first.access_token))
            .await
            .unwrap();
        let retry_b = resolver
            .resolve_forced(&calendar(), Some(&second.access_token))
            .await
            .unwrap();

        assert_eq!(retry_a.access_token, "ya29.refreshed");
        assert_eq!(retry_b.access_token, "ya29.refreshed");
        assert_eq!(harness.refreshes(), 1);
        assert_eq!(harness.store.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_forced_resolutions_refresh_once() {
        let future = Utc::now() + ChronoDuration::hours(1);
        let harness = Harness::new(MemoryStore::with_record(user_record("ya29.cached", future, Some("1//r"))));
        let resolver = harness.resolver();
        let rejected = resolver.resolve(&calendar()).await.unwrap().access_token;

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let resolver = resolver.clone();
                let rejected = rejected.clone();
                tokio::spawn(async move { resolver.resolve_forced(&calendar(), Some(&rejected)).await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().access_token, "ya29.refreshed");
        }
        assert_eq!(harness.refreshes(), 1);
        assert_eq!(harness.store.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn forced_resolution_uses_stored_token_newer_than_rejected() {
        let future = Utc::now() + ChronoDuration::hours(1);
        let harness = Harness::new(MemoryStore::with_record(user_record("ya29.newer", future, Some("1//r"))));

        let credential = harness
            .resolver()
            .resolve_forced(&calendar(), Some("ya29.older"))
            .await
            .unwrap();

        assert_eq!(credential.access_token, "ya29.newer");
        assert_eq!(credential.source, SourceKind::CachedUserToken);
        assert_eq!(harness.refreshes(), 0);
        assert_eq!(harness.store.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn corrupt_token_record_is_treated_as_absent() {
        let harness = Harness::new(MemoryStore::corrupt()).with_client_secret();

        let credential = harness.resolver().resolve(&calendar()).await.unwrap();

        assert_eq!(credential.source, SourceKind::InteractiveFlow);
        assert_eq!(credential.access_token, "ya29.interactive");
        assert_eq!(harness.store.loads.load(Ordering::SeqCst), 1);
        assert_eq!(harness.refreshes(), 0);
        assert_eq!(harness.authorizations(), 1);
    }

    #[tokio::test]
    async fn malformed_key_file_falls_through_to_cached_token() {
        let future = Utc::now() + ChronoDuration::hours(1);
        let harness = Harness::new(MemoryStore::with_record(user_record("ya29.cached", future, Some("1//r"))));
        let key_path = harness.dir.path().join("service_account.json");
        std::fs::write(&key_path, "{ not json").unwrap();
        let config = harness.config().with_service_account_path(Some(key_path));

        let credential = harness.resolver_with(config).resolve(&calendar()).await.unwrap();

        assert_eq!(credential.source, SourceKind::CachedUserToken);
        assert_eq!(credential.access_token, "ya29.cached");
        assert_eq!(harness.refreshes(), 0);
        assert_eq!(harness.authorizations(), 0);
    }

    #[tokio::test]
    async fn refresh_returning_expired_token_falls_through() {
        let expired = Utc::now() - ChronoDuration::minutes(10);
        let mut instant_expiry = grant("ya29.stillborn", None);
        instant_expiry.expires_in = Some(0);
        let harness = Harness::new(MemoryStore::with_record(user_record("ya29.old", expired, Some("1//r"))))
            .with_endpoint_result(Ok(instant_expiry));

        let err = harness.resolver().resolve(&calendar()).await.unwrap_err();

        assert_eq!(err.code(), AuthErrorCode::AuthenticationFailed);
        assert_eq!(harness.refreshes(), 1);
        assert_eq!(harness.store.saves.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn strategy_order() {
        assert_eq!(
            AcquisitionStrategy::ORDER.map(AcquisitionStrategy::source_kind),
            [
                SourceKind::EmbeddedConfig,
                SourceKind::ServiceAccountFile,
                SourceKind::CachedUserToken,
                SourceKind::InteractiveFlow,
            ]
        );
    }
}
