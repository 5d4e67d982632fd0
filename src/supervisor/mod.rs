//! Supervision layer for the worker fleet
//!
//! - Prober reads each worker's queue depth
//! - Restart controller issues stop/verify/start sequences
//! - Watchdog restarts workers whose queue is stuck
//! - Sweeper deletes expired generated artifacts
//! - Scheduler runs sweep + full fleet restart on a fixed cadence
//! - Bootstrap keeps the watchdog and sweeper themselves running

pub mod bootstrap;
pub mod log_limiter;
pub mod prober;
pub mod restart;
pub mod scheduler;
pub mod sweeper;
pub mod watchdog;

pub use bootstrap::{BootstrapSettings, BootstrapSummary, CleanupMode, SupervisorBootstrap};
pub use log_limiter::LogLimiter;
pub use prober::{HealthProbe, HttpProber};
pub use restart::{RestartController, RestartGuard, RestartReport, RestartResult, RestartTiming};
pub use scheduler::{CycleReport, RestartScheduler};
pub use sweeper::{RetentionSweeper, SweepReport};
pub use watchdog::{QueueWatchdog, TickReport, WatchdogEvent, WatchdogSettings};
