//! HTTP façade over the calendar service.
//!
//! Exposes list/create/get/update/delete routes under `/calendar/events`,
//! gated by the configured [`TrustModel`], and shuts down gracefully on
//! SIGINT/SIGTERM.
//!
//! # Example
//!
//! ```rust,no_run
//! use gcalmcp_auth::ResolverConfig;
//! use gcalmcp_server::{ServerConfig, SignalHandler, build_service, serve};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let service = build_service(ResolverConfig::default(), &config)?;
//!     let signals = SignalHandler::new();
//!     signals.spawn_listener();
//!     serve(&config, service, signals.shutdown_handle()).await?;
//!     Ok(())
//! }
//! ```

mod auth;
mod config;
mod error;
mod routes;
mod signals;

use gcalmcp_auth::{CredentialResolver, ResolverConfig};
use gcalmcp_calendar::{CalendarAdapter, CalendarService};
use tokio::net::TcpListener;
use tracing::info;

pub use auth::JwtVerifier;
pub use config::{DEFAULT_PORT, JwtSettings, ServerConfig, TrustModel, TrustModelKind};
pub use error::{ApiError, ServerError, ServerResult};
pub use routes::{AppState, SharedState, router};
pub use signals::{ShutdownHandle, SignalHandler};

/// Wires a resolver and adapter into a calendar service.
pub fn build_service(
    resolver_config: ResolverConfig,
    config: &ServerConfig,
) -> ServerResult<CalendarService> {
    let resolver = CredentialResolver::new(resolver_config)?;
    let adapter = CalendarAdapter::new(config.http_timeout)?;
    Ok(CalendarService::new(resolver, adapter).with_calendar_id(&config.calendar_id))
}

/// Binds and serves until `shutdown` fires.
pub async fn serve(
    config: &ServerConfig,
    service: CalendarService,
    shutdown: ShutdownHandle,
) -> ServerResult<()> {
    config.validate()?;
    let app = router(service, &config.trust);

    let listener = TcpListener::bind(config.socket_addr()).await?;
    info!(
        addr = %listener.local_addr()?,
        trust = config.trust.name(),
        "gcalmcp listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;

    info!("server stopped");
    Ok(())
}
