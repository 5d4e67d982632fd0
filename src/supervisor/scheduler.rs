//! Scheduled Restart Coordinator
//!
//! Every `full_restart_interval` runs a retention sweep and then a
//! fleet-wide restart, in that order. It is independent of the watchdog's
//! per-instance restarts; the two can overlap and the process manager's own
//! idempotency is the only arbitration.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use super::restart::{RestartController, RestartReport};
use super::sweeper::{RetentionSweeper, SweepReport};
use crate::coordination::ShutdownToken;

/// Result of one scheduled cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub sweep: SweepReport,
    pub restart: RestartReport,
}

pub struct RestartScheduler {
    interval: Duration,
    sweeper: RetentionSweeper,
    controller: Arc<RestartController>,
}

impl RestartScheduler {
    pub fn new(interval: Duration, sweeper: RetentionSweeper, controller: Arc<RestartController>) -> Self {
        Self {
            interval,
            sweeper,
            controller,
        }
    }

    /// Sweep first, then restart the fleet. Never concurrent.
    pub async fn run_cycle(&self) -> CycleReport {
        info!("Scheduled full restart: cleaning artifacts first");
        let sweep = self.sweeper.sweep_now().await;

        let restart = self.controller.restart_all().await;
        if let Some(phase) = restart.failed_phase() {
            error!("Scheduled full restart failed while {}", phase);
        }

        CycleReport { sweep, restart }
    }

    /// Run cycles every interval until shutdown. The first cycle fires one
    /// full interval after start.
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            "Restart scheduler started: full restart every {}s",
            self.interval.as_secs()
        );

        let start = tokio::time::Instant::now() + self.interval;
        let mut interval = tokio::time::interval_at(start, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = self.run_cycle() => {}
                    }
                }
            }
        }

        info!("Restart scheduler stopped");
    }
}
