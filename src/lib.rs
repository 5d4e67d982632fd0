pub mod adapters;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod supervisor;

pub use config::AppConfig;
pub use coordination::{Shutdown, ShutdownToken};
pub use error::{Result, WardenError};
pub use supervisor::{
    QueueWatchdog, RestartController, RestartScheduler, RetentionSweeper, SupervisorBootstrap,
};
