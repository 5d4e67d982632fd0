//! fleetwarden CLI
//!
//! Commands:
//! - `fleetwarden run` - Watchdog, scheduler and sweeper in one process
//! - `fleetwarden watchdog` - Supervised watchdog service (plus scheduler)
//! - `fleetwarden sweeper` - Supervised retention sweeper service
//! - `fleetwarden bootstrap` - Ensure both services run under the process manager
//! - `fleetwarden sweep | probe | restart` - One-shot operations

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Fleet supervisor for image-generation workers
#[derive(Parser, Debug)]
#[command(name = "fleetwarden")]
#[command(author, version, about = "Keeps a fleet of image-generation workers healthy")]
pub struct Cli {
    /// Directory holding default.toml and environment overrides
    #[arg(long, global = true, env = "WARDEN_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run watchdog, scheduled restarts and sweeper together
    Run,

    /// Run the queue watchdog (and scheduled restarts when enabled)
    Watchdog,

    /// Run the retention sweeper loop
    Sweeper,

    /// Run one retention sweep and exit
    Sweep,

    /// Probe every instance once and print the samples
    Probe,

    /// Restart one instance, or `all` for the whole fleet
    Restart {
        /// Instance id or `all`
        target: String,
    },

    /// Make sure the watchdog and sweeper services are running
    Bootstrap,
}

impl Commands {
    /// Name of the log file this command writes to
    pub fn service_name(&self) -> &'static str {
        match self {
            Commands::Run => "fleetwarden",
            Commands::Watchdog => "watchdog",
            Commands::Sweeper | Commands::Sweep => "sweeper",
            Commands::Probe | Commands::Restart { .. } => "control",
            Commands::Bootstrap => "bootstrap",
        }
    }
}
