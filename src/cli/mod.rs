//! CLI module
//!
//! Single entry point: `rootfs-quota [--config <path>]`. Loads the
//! configuration and the state document, then runs the reconciliation
//! engine until SIGINT/SIGTERM.

mod args;
mod commands;
mod config;
mod errors;

pub use args::{Cli, DEFAULT_CONFIG_PATH};
pub use commands::{run, start};
pub use config::Config;
pub use errors::{CliError, CliErrorCode, CliResult};
