//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// gcalmcp - Google Calendar over HTTP
#[derive(Debug, Parser)]
#[command(name = "gcalmcp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, global = true, env = "GCALMCP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

/// Settings that override `config.toml`. Each also reads its environment
/// variable.
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// Service-account key JSON, base64 encoded (supports env:: and pass::)
    #[arg(long, global = true, env = "CREDENTIALS_CONFIG", hide_env_values = true)]
    pub credentials_config: Option<String>,

    /// Path to a service-account key file
    #[arg(long, global = true, env = "SERVICE_ACCOUNT_PATH")]
    pub service_account_path: Option<PathBuf>,

    /// Path to the cached user token
    #[arg(long, global = true, env = "TOKEN_PATH")]
    pub token_path: Option<PathBuf>,

    /// Path to the OAuth client secret file
    #[arg(long, global = true, env = "CREDENTIALS_PATH")]
    pub credentials_path: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, global = true, env = "HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, global = true, env = "PORT")]
    pub port: Option<u16>,

    /// Inbound trust model: none or bearer-jwt
    #[arg(long, global = true, env = "GCALMCP_TRUST_MODEL")]
    pub trust_model: Option<String>,

    /// Shared secret for bearer-jwt (supports env:: and pass::)
    #[arg(long, global = true, env = "GCALMCP_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Required JWT audience
    #[arg(long, global = true, env = "GCALMCP_JWT_AUDIENCE")]
    pub jwt_audience: Option<String>,

    /// Required JWT issuer
    #[arg(long, global = true, env = "GCALMCP_JWT_ISSUER")]
    pub jwt_issuer: Option<String>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server in the foreground
    Serve,

    /// Credential commands
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Credential actions.
#[derive(Debug, Subcommand)]
pub enum AuthAction {
    /// Obtain credentials now, running the browser consent flow if needed
    Init {
        /// Treat the cached token as rejected and refresh or re-authorize
        #[arg(long, short)]
        force: bool,
    },

    /// Show the cached user token without contacting Google
    Status,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump the effective configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_auth_init_force() {
        let cli = Cli::try_parse_from(["gcalmcp", "auth", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Auth {
                action: AuthAction::Init { force: true }
            }
        ));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "gcalmcp",
            "serve",
            "--port",
            "9000",
            "--trust-model",
            "bearer-jwt",
            "--debug",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Serve));
        assert!(cli.debug);
        assert_eq!(cli.overrides.port, Some(9000));
        assert_eq!(cli.overrides.trust_model.as_deref(), Some("bearer-jwt"));
    }

    #[test]
    fn config_subcommands() {
        for (arg, expected) in [("dump", "Dump"), ("validate", "Validate"), ("path", "Path")] {
            let cli = Cli::try_parse_from(["gcalmcp", "config", arg]).unwrap();
            let Command::Config { action } = cli.command else {
                panic!("expected config command");
            };
            assert_eq!(format!("{:?}", action), expected);
        }
    }

    #[test]
    fn rejects_bad_port() {
        assert!(Cli::try_parse_from(["gcalmcp", "serve", "--port", "http"]).is_err());
    }
}
