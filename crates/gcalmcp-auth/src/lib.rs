//! Google credentials for gcalmcp.
//!
//! This crate turns configuration into a bearer [`Credential`] the calendar
//! client can use. Sources are tried in a fixed order by
//! [`CredentialResolver`]:
//!
//! - an embedded service-account key (base64 in configuration)
//! - a service-account key file
//! - a cached user token from the [`CredentialStore`], refreshed when expired
//! - an interactive browser consent flow
//!
//! # Example
//!
//! ```ignore
//! use gcalmcp_auth::{CredentialResolver, ResolverConfig, ScopeSet};
//!
//! let resolver = CredentialResolver::new(ResolverConfig::default())?;
//! let credential = resolver.resolve(&ScopeSet::default()).await?;
//! ```

pub mod client_secret;
pub mod config;
pub mod credential;
pub mod error;
pub mod oauth;
pub mod resolver;
pub mod service_account;
pub mod store;

pub use client_secret::ClientSecret;
pub use config::{DEFAULT_REDIRECT_URI, DEFAULT_SCOPE, ResolverConfig};
pub use credential::{ClientIdentity, Credential, ScopeSet, SourceKind};
pub use error::{AuthError, AuthErrorCode, AuthResult};
pub use oauth::{
    BoxFuture, HttpTokenEndpoint, InteractiveAuthorizer, LoopbackAuthorizer, RefreshRequest,
    TokenEndpoint, TokenGrant,
};
pub use resolver::{AcquisitionStrategy, CredentialResolver};
pub use service_account::ServiceAccountKey;
pub use store::{CredentialStore, FileTokenStore, StoreError, TokenRecord};
