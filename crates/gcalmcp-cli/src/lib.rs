//! gcalmcp command line.
//!
//! Loads layered configuration and runs the server or the credential and
//! configuration commands.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;

pub use cli::Cli;
pub use config::AppConfig;
pub use error::{CliError, CliResult};
