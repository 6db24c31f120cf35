//! gcalmcp CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use gcalmcp_core::{TracingConfig, init_tracing};
use tracing::debug;

use gcalmcp_cli::cli::{AuthAction, Cli, Command, ConfigAction};
use gcalmcp_cli::commands;
use gcalmcp_cli::config::AppConfig;
use gcalmcp_cli::error::CliResult;

#[tokio::main]
async fn main() -> ExitCode {
    // .env feeds the environment before clap reads it; a missing file is fine.
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    let tracing_config = if cli.debug {
        TracingConfig::cli_debug()
    } else if matches!(cli.command, Command::Serve) {
        TracingConfig::daemon()
    } else {
        TracingConfig::cli()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }
    if let Ok(path) = dotenv {
        debug!(path = %path.display(), "loaded .env");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_overrides(&cli.overrides);
    config.debug |= cli.debug;

    match cli.command {
        Command::Serve => commands::serve::run(&config).await,
        Command::Auth { action } => match action {
            AuthAction::Init { force } => commands::auth::init(config.resolver_config()?, force).await,
            AuthAction::Status => commands::auth::status(&config.resolver_config()?),
        },
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, &config_path),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(&config_path),
        },
    }
}
