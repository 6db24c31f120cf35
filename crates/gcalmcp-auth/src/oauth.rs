//! OAuth 2.0 endpoints: token refresh and the loopback consent flow.
//!
//! Both are reached through object-safe traits so the resolver can be driven
//! by fakes in tests.
//!
//! # Consent flow
//!
//! 1. Generate a PKCE code verifier and its SHA-256 challenge
//! 2. Listen on the configured loopback redirect URI
//! 3. Open the user's browser to Google's consent page
//! 4. Google redirects back with an authorization code
//! 5. Exchange the code (with verifier) for access and refresh tokens

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::client_secret::ClientSecret;
use crate::credential::ScopeSet;
use crate::error::{AuthError, AuthResult};

/// Google OAuth endpoints.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// The PKCE code verifier length (in bytes, before base64 encoding).
const CODE_VERIFIER_LENGTH: usize = 32;

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Response from a token endpoint, for both code exchange and refresh.
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Space-separated scopes actually granted.
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenGrant {
    /// Scopes the endpoint reports as granted, if it reported any.
    pub fn granted_scopes(&self) -> Option<ScopeSet> {
        self.scope
            .as_deref()
            .map(ScopeSet::from_space_separated)
            .filter(|scopes| !scopes.is_empty())
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[redacted]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Error body returned by Google's token endpoint.
#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Parameters for a refresh-token grant.
#[derive(Clone, Copy)]
pub struct RefreshRequest<'a> {
    pub token_uri: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub refresh_token: &'a str,
}

/// Exchanges a refresh token for a new access token.
pub trait TokenEndpoint: Send + Sync {
    fn refresh<'a>(&'a self, request: RefreshRequest<'a>) -> BoxFuture<'a, AuthResult<TokenGrant>>;
}

/// Obtains a fresh user grant through browser consent.
pub trait InteractiveAuthorizer: Send + Sync {
    fn authorize<'a>(
        &'a self,
        client: &'a ClientSecret,
        scopes: &'a ScopeSet,
    ) -> BoxFuture<'a, AuthResult<TokenGrant>>;
}

fn http_client(timeout: Duration) -> AuthResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("gcalmcp/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AuthError::config_invalid("failed to create HTTP client").with_source(e))
}

/// Posts a form to a token endpoint and decodes the grant.
async fn post_token_form(
    http: &reqwest::Client,
    token_uri: &str,
    params: &[(&str, &str)],
    what: &str,
) -> AuthResult<TokenGrant> {
    let response = http
        .post(token_uri)
        .form(params)
        .send()
        .await
        .map_err(|e| {
            AuthError::authentication_failed(format!("{} request failed", what)).with_source(e)
        })?;

    let status = response.status();
    let body = response.text().await.map_err(|e| {
        AuthError::authentication_failed(format!("failed to read {} response", what))
            .with_source(e)
    })?;

    if !status.is_success() {
        let reason = serde_json::from_str::<TokenErrorBody>(&body)
            .map(|b| match b.error_description {
                Some(desc) => format!("{}: {}", b.error, desc),
                None => b.error,
            })
            .unwrap_or_else(|_| status.to_string());
        return Err(AuthError::authentication_failed(format!(
            "{} rejected ({}): {}",
            what,
            status.as_u16(),
            reason
        )));
    }

    serde_json::from_str(&body).map_err(|e| {
        AuthError::authentication_failed(format!("invalid {} response", what)).with_source(e)
    })
}

/// [`TokenEndpoint`] that talks to a real OAuth token URI over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpTokenEndpoint {
    http: reqwest::Client,
}

impl HttpTokenEndpoint {
    pub fn new(timeout: Duration) -> AuthResult<Self> {
        Ok(Self {
            http: http_client(timeout)?,
        })
    }
}

impl TokenEndpoint for HttpTokenEndpoint {
    fn refresh<'a>(&'a self, request: RefreshRequest<'a>) -> BoxFuture<'a, AuthResult<TokenGrant>> {
        Box::pin(async move {
            let params = [
                ("client_id", request.client_id),
                ("client_secret", request.client_secret),
                ("refresh_token", request.refresh_token),
                ("grant_type", "refresh_token"),
            ];
            let grant = post_token_form(&self.http, request.token_uri, &params, "token refresh")
                .await?;
            info!("successfully refreshed access token");
            Ok(grant)
        })
    }
}

/// [`InteractiveAuthorizer`] that runs the PKCE flow against a loopback
/// redirect URI.
///
/// The redirect URI is fixed so it can be registered with the OAuth client.
#[derive(Debug, Clone)]
pub struct LoopbackAuthorizer {
    redirect_uri: Url,
    http: reqwest::Client,
    open_browser: bool,
}

impl LoopbackAuthorizer {
    pub fn new(redirect_uri: Url, timeout: Duration) -> AuthResult<Self> {
        Ok(Self {
            redirect_uri,
            http: http_client(timeout)?,
            open_browser: true,
        })
    }

    /// Disables launching a browser; the consent URL is only printed.
    pub fn with_open_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }

    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    async fn bind(&self) -> AuthResult<TcpListener> {
        let host = match self.redirect_uri.host_str() {
            Some("localhost") | None => "127.0.0.1",
            Some(host) => host.trim_start_matches('[').trim_end_matches(']'),
        };
        let port = self.redirect_uri.port_or_known_default().unwrap_or(80);
        let listener = TcpListener::bind((host, port)).await.map_err(|e| {
            AuthError::authentication_failed(format!(
                "failed to listen on redirect port {}",
                port
            ))
            .with_source(e)
        })?;
        debug!("bound loopback server on {}:{}", host, port);
        Ok(listener)
    }

    async fn run(&self, client: &ClientSecret, scopes: &ScopeSet) -> AuthResult<TokenGrant> {
        let pkce = PkceFlow::new();
        let listener = self.bind().await?;
        let redirect_uri = self.redirect_uri.as_str();
        let auth_url = pkce.build_auth_url(&client.auth_uri, &client.client_id, redirect_uri, scopes);

        info!("starting OAuth consent flow");
        debug!("authorization URL: {}", auth_url);
        eprintln!("\nPlease open this URL in your browser to authorize access:\n\n{}\n", auth_url);
        if self.open_browser {
            let url = auth_url.clone();
            match tokio::task::spawn_blocking(move || open::that(url)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("failed to open browser: {}", e),
                Err(e) => warn!("browser launcher task failed: {}", e),
            }
        }

        let callback = wait_for_callback(&listener, self.redirect_uri.path()).await?;
        if callback.state.as_deref() != Some(pkce.state.as_str()) {
            return Err(AuthError::authentication_failed(
                "OAuth state mismatch in redirect",
            ));
        }

        info!("received authorization code, exchanging for tokens");
        let params = [
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
            ("code", callback.code.as_str()),
            ("code_verifier", pkce.verifier.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];
        let grant = post_token_form(&self.http, &client.token_uri, &params, "token exchange").await?;
        info!("successfully obtained tokens");
        Ok(grant)
    }
}

impl InteractiveAuthorizer for LoopbackAuthorizer {
    fn authorize<'a>(
        &'a self,
        client: &'a ClientSecret,
        scopes: &'a ScopeSet,
    ) -> BoxFuture<'a, AuthResult<TokenGrant>> {
        Box::pin(self.run(client, scopes))
    }
}

/// Parameters delivered to the redirect URI.
#[derive(Debug, PartialEq, Eq)]
struct Callback {
    code: String,
    state: Option<String>,
}

/// Accepts connections until one carries the OAuth redirect.
async fn wait_for_callback(listener: &TcpListener, path: &str) -> AuthResult<Callback> {
    loop {
        let (stream, peer) = listener.accept().await.map_err(|e| {
            AuthError::authentication_failed("failed to accept redirect connection").with_source(e)
        })?;
        debug!("redirect connection from {}", peer);
        if let Some(result) = handle_connection(stream, path).await {
            return result;
        }
    }
}

async fn handle_connection(stream: TcpStream, path: &str) -> Option<AuthResult<Callback>> {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await.is_err() {
        return None;
    }

    let outcome = parse_callback(&request_line, path);
    let response: &[u8] = match &outcome {
        None => b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        Some(Ok(_)) => {
            b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
            <html><body><h1>Authorization Successful</h1>\
            <p>You can close this window.</p></body></html>"
        }
        Some(Err(_)) => {
            b"HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
            <html><body><h1>Authorization Failed</h1>\
            <p>You can close this window.</p></body></html>"
        }
    };
    let _ = write.write_all(response).await;
    let _ = write.shutdown().await;
    outcome
}

/// Parses an HTTP request line such as `GET /?code=...&state=... HTTP/1.1`.
///
/// Returns `None` for requests that are not the redirect (favicon probes and
/// the like), so the caller keeps listening.
fn parse_callback(request_line: &str, expected_path: &str) -> Option<AuthResult<Callback>> {
    let mut parts = request_line.split_whitespace();
    if parts.next() != Some("GET") {
        return None;
    }
    let target = parts.next()?;
    let url = Url::parse(&format!("http://localhost{}", target)).ok()?;
    if url.path().trim_end_matches('/') != expected_path.trim_end_matches('/') {
        return None;
    }

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Some(Err(AuthError::authentication_failed(format!(
            "authorization denied: {}",
            error
        ))));
    }
    match code {
        Some(code) => Some(Ok(Callback { code, state })),
        None => Some(Err(AuthError::authentication_failed(
            "missing authorization code in redirect",
        ))),
    }
}

/// PKCE flow state (RFC 7636).
#[derive(Debug)]
pub struct PkceFlow {
    /// The code verifier (high-entropy random string).
    pub verifier: String,
    /// The code challenge (SHA-256 hash of verifier, base64url encoded).
    pub challenge: String,
    /// Random state for CSRF protection.
    pub state: String,
}

impl PkceFlow {
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: random_token(16),
        }
    }

    fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }

    /// Builds the consent URL. Requests offline access so a refresh token is
    /// issued.
    pub fn build_auth_url(
        &self,
        auth_uri: &str,
        client_id: &str,
        redirect_uri: &str,
        scopes: &ScopeSet,
    ) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&\
            access_type=offline&prompt=consent",
            auth_uri,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes.to_space_separated()),
            urlencoding::encode(&self.challenge),
            urlencoding::encode(&self.state),
        )
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}
