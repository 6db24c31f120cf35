//! Configuration commands.

use std::path::Path;

use crate::config::AppConfig;
use crate::error::{CliError, CliResult};

/// Prints the effective configuration with inline secrets masked.
pub fn dump(config: &AppConfig, path: &Path) -> CliResult<()> {
    let rendered = toml::to_string_pretty(&config.redacted())
        .map_err(|e| CliError::config(format!("failed to serialize config: {}", e)))?;
    println!("# {}", path.display());
    println!("{}", rendered);
    Ok(())
}

/// Checks that the configuration can be turned into resolver and server
/// settings, including secret references.
pub fn validate(config: &AppConfig) -> CliResult<()> {
    let resolver = config.resolver_config()?;
    let server = config.server_config()?;

    let sources = [
        ("embedded credentials", resolver.embedded_credentials.is_some()),
        (
            "service account file",
            resolver.service_account_path.as_deref().is_some_and(Path::exists),
        ),
        ("cached user token", resolver.token_path.exists()),
        ("OAuth client secret", resolver.client_secret_path.exists()),
    ];
    for (name, present) in sources {
        println!("  {:<22} {}", name, if present { "found" } else { "not found" });
    }
    println!("  {:<22} {}", "listen", server.socket_addr());
    println!("  {:<22} {}", "trust model", server.trust.name());

    if sources.iter().all(|(_, present)| !present) {
        return Err(CliError::config(
            "no credential source is configured; add a service account or an OAuth client secret",
        ));
    }

    println!("Configuration is valid.");
    Ok(())
}

/// Prints the configuration file path.
pub fn path(path: &Path) -> CliResult<()> {
    println!("config: {}", path.display());
    Ok(())
}
