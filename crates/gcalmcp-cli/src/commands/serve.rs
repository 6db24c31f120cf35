//! Run the HTTP server.

use gcalmcp_server::{SignalHandler, build_service, serve};
use tracing::info;

use crate::config::AppConfig;
use crate::error::CliResult;

/// Builds the service from configuration and serves until SIGINT/SIGTERM.
pub async fn run(config: &AppConfig) -> CliResult<()> {
    let resolver = config.resolver_config()?;
    let server = config.server_config()?;
    info!(
        token_path = %resolver.token_path.display(),
        calendar = %server.calendar_id,
        "starting gcalmcp"
    );

    let service = build_service(resolver, &server)?;
    let signals = SignalHandler::new();
    signals.spawn_listener();
    serve(&server, service, signals.shutdown_handle()).await?;
    Ok(())
}
