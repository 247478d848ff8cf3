pub mod serve;
pub mod validate;

use crate::infra::config::DEFAULT_CONFIG_PATH;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "localcloud",
    version,
    about = "Local cloud service emulation backed by containers"
)]
pub struct Cli {
    /// Configuration file (YAML, or TOML by extension)
    #[arg(long, env = "LOCALCLOUD_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "LOCALCLOUD_LOG", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start every enabled service and serve HTTP until interrupted (default)
    Serve {
        /// Overrides server.port from the configuration
        #[arg(long)]
        port: Option<u16>,
    },
    /// Load and validate the configuration, then exit
    Validate,
}

impl Cli {
    pub fn action(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or(Commands::Serve { port: None })
    }
}

/// Installs the global subscriber; RUST_LOG wins over `level`
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
