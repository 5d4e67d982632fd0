//! Restart Controller
//!
//! Stop -> settle -> verify -> start sequences for one instance or the whole
//! fleet. Each sequence is strictly sequential; sequences for different
//! instances may run concurrently. Adapter failures are reported in the
//! returned [`RestartReport`] together with the phase that failed. There is
//! no retry loop here: the caller's own cadence is the retry driver.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::adapters::ProcessManager;
use crate::config::{RestartConfig, WatchdogConfig};
use crate::domain::{Instance, ProcessState, RestartOutcome, RestartPhase, Target};
use crate::error::{Result, WardenError};

/// Timing knobs for restart sequences
#[derive(Debug, Clone)]
pub struct RestartTiming {
    pub instance_settle: Duration,
    pub fleet_settle: Duration,
    pub stop_confirm_attempts: u32,
    pub stop_confirm_delay: Duration,
    pub cooldown: Duration,
}

impl RestartTiming {
    pub fn from_config(restart: &RestartConfig, watchdog: &WatchdogConfig) -> Self {
        Self {
            instance_settle: Duration::from_secs(restart.instance_settle_secs),
            fleet_settle: Duration::from_secs(restart.fleet_settle_secs),
            stop_confirm_attempts: restart.stop_confirm_attempts.max(1),
            stop_confirm_delay: Duration::from_secs(restart.stop_confirm_delay_secs),
            cooldown: watchdog.restart_cooldown(),
        }
    }

    /// No delays at all; used by tests and one-shot CLI runs
    pub fn immediate() -> Self {
        Self {
            instance_settle: Duration::ZERO,
            fleet_settle: Duration::ZERO,
            stop_confirm_attempts: 1,
            stop_confirm_delay: Duration::ZERO,
            cooldown: Duration::ZERO,
        }
    }
}

/// How a restart sequence ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartResult {
    Completed,
    Failed { phase: RestartPhase, reason: String },
    /// Refused by the per-instance guard; nothing was issued
    Skipped { reason: String },
}

/// Everything one restart call did, in emission order
#[derive(Debug, Clone)]
pub struct RestartReport {
    pub target: Target,
    pub outcomes: Vec<RestartOutcome>,
    pub result: RestartResult,
}

impl RestartReport {
    pub fn success(&self) -> bool {
        self.result == RestartResult::Completed
    }

    pub fn failed_phase(&self) -> Option<RestartPhase> {
        match &self.result {
            RestartResult::Failed { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    pub fn was_skipped(&self) -> bool {
        matches!(self.result, RestartResult::Skipped { .. })
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    InFlight,
    CoolingDown { until: Instant },
}

/// Per-instance "restart in progress, expires at T" guard
#[derive(Debug, Clone)]
pub struct RestartGuard {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
    cooldown: Duration,
}

/// Held for the duration of one restart; releasing starts the cooldown
#[derive(Debug)]
pub struct RestartPermit {
    id: String,
    guard: RestartGuard,
}

impl RestartGuard {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            cooldown,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim the instance, or explain why it is locked out
    pub fn try_acquire(&self, id: &str) -> std::result::Result<RestartPermit, String> {
        let now = Instant::now();
        let mut slots = self.lock();
        match slots.get(id) {
            Some(Slot::InFlight) => return Err("restart already in progress".to_string()),
            Some(Slot::CoolingDown { until }) if *until > now => {
                return Err(format!(
                    "cooling down for another {}s",
                    until.saturating_duration_since(now).as_secs()
                ));
            }
            _ => {}
        }
        slots.insert(id.to_string(), Slot::InFlight);
        Ok(RestartPermit {
            id: id.to_string(),
            guard: self.clone(),
        })
    }

    pub fn is_locked(&self, id: &str) -> bool {
        match self.lock().get(id) {
            Some(Slot::InFlight) => true,
            Some(Slot::CoolingDown { until }) => *until > Instant::now(),
            None => false,
        }
    }

    fn release(&self, id: &str) {
        let mut slots = self.lock();
        if self.cooldown.is_zero() {
            slots.remove(id);
        } else {
            slots.insert(
                id.to_string(),
                Slot::CoolingDown {
                    until: Instant::now() + self.cooldown,
                },
            );
        }
    }
}

impl Drop for RestartPermit {
    fn drop(&mut self) {
        self.guard.release(&self.id);
    }
}

/// Issues lifecycle commands for instances through the process manager
pub struct RestartController {
    pm: Arc<dyn ProcessManager>,
    instances: Vec<Instance>,
    timing: RestartTiming,
    guard: RestartGuard,
    event_tx: broadcast::Sender<RestartOutcome>,
}

impl RestartController {
    pub fn new(pm: Arc<dyn ProcessManager>, instances: Vec<Instance>, timing: RestartTiming) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let guard = RestartGuard::new(timing.cooldown);
        Self {
            pm,
            instances,
            timing,
            guard,
            event_tx,
        }
    }

    /// Subscribe to every emitted outcome, in order
    pub fn subscribe(&self) -> broadcast::Receiver<RestartOutcome> {
        self.event_tx.subscribe()
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn guard(&self) -> &RestartGuard {
        &self.guard
    }

    fn record(
        &self,
        outcomes: &mut Vec<RestartOutcome>,
        target: &Target,
        phase: RestartPhase,
        success: bool,
        attempt: u32,
    ) {
        let outcome = RestartOutcome {
            target: target.clone(),
            phase,
            success,
            attempt,
        };
        let _ = self.event_tx.send(outcome.clone());
        outcomes.push(outcome);
    }

    /// Restart a single instance: stop, settle, confirm stopped, start.
    ///
    /// A stop failure never leads to a start, so two copies cannot run.
    pub async fn restart_instance(&self, id: &str) -> Result<RestartReport> {
        if !self.instances.iter().any(|i| i.id == id) {
            return Err(WardenError::UnknownInstance(id.to_string()));
        }
        let target = Target::named(id);

        let _permit = match self.guard.try_acquire(id) {
            Ok(permit) => permit,
            Err(reason) => {
                info!("Skipping restart of {}: {}", id, reason);
                return Ok(RestartReport {
                    target,
                    outcomes: Vec::new(),
                    result: RestartResult::Skipped { reason },
                });
            }
        };

        let mut outcomes = Vec::new();

        info!("Stopping instance {}", id);
        if let Err(e) = self.pm.stop(&target).await {
            error!("Stop of {} failed, not starting: {}", id, e);
            self.record(&mut outcomes, &target, RestartPhase::Stopping, false, 1);
            return Ok(RestartReport {
                target,
                outcomes,
                result: RestartResult::Failed {
                    phase: RestartPhase::Stopping,
                    reason: e.to_string(),
                },
            });
        }
        self.record(&mut outcomes, &target, RestartPhase::Stopping, true, 1);

        tokio::time::sleep(self.timing.instance_settle).await;

        let confirmed = self.confirm_stopped(id, &target, &mut outcomes).await;
        if !confirmed {
            warn!(
                "{} still reported running after {} checks, starting anyway",
                id, self.timing.stop_confirm_attempts
            );
        }

        info!("Starting instance {}", id);
        if let Err(e) = self.pm.start(&target).await {
            error!("Start of {} failed: {}", id, e);
            self.record(&mut outcomes, &target, RestartPhase::Starting, false, 1);
            return Ok(RestartReport {
                target,
                outcomes,
                result: RestartResult::Failed {
                    phase: RestartPhase::Starting,
                    reason: e.to_string(),
                },
            });
        }
        self.record(&mut outcomes, &target, RestartPhase::Starting, true, 1);

        info!("Instance {} restarted", id);
        Ok(RestartReport {
            target,
            outcomes,
            result: RestartResult::Completed,
        })
    }

    async fn confirm_stopped(
        &self,
        id: &str,
        target: &Target,
        outcomes: &mut Vec<RestartOutcome>,
    ) -> bool {
        let attempts = self.timing.stop_confirm_attempts.max(1);
        for attempt in 1..=attempts {
            let stopped = match self.pm.status(target).await {
                Ok(entries) => entries.iter().all(|e| e.name != id || !e.state.is_running()),
                Err(e) => {
                    error!("Status of {} failed during stop confirmation: {}", id, e);
                    false
                }
            };
            self.record(outcomes, target, RestartPhase::Verifying, stopped, attempt);
            if stopped {
                return true;
            }
            if attempt < attempts {
                tokio::time::sleep(self.timing.stop_confirm_delay).await;
            }
        }
        false
    }

    /// Restart the whole fleet: stop all, settle, count stopped, start all.
    ///
    /// An incomplete stop is logged and the start is issued regardless.
    pub async fn restart_all(&self) -> RestartReport {
        let target = Target::All;
        let mut outcomes = Vec::new();

        info!("Stopping all {} instances", self.instances.len());
        if let Err(e) = self.pm.stop(&target).await {
            error!("Fleet stop failed, not starting: {}", e);
            self.record(&mut outcomes, &target, RestartPhase::Stopping, false, 1);
            return RestartReport {
                target,
                outcomes,
                result: RestartResult::Failed {
                    phase: RestartPhase::Stopping,
                    reason: e.to_string(),
                },
            };
        }
        self.record(&mut outcomes, &target, RestartPhase::Stopping, true, 1);

        tokio::time::sleep(self.timing.fleet_settle).await;

        let total = self.instances.len();
        match self.count_stopped().await {
            Ok(stopped) if stopped >= total => {
                info!("All {} instances confirmed stopped", total);
                self.record(&mut outcomes, &target, RestartPhase::Verifying, true, 1);
            }
            Ok(stopped) => {
                warn!(
                    "Only {}/{} instances confirmed stopped, starting fleet anyway",
                    stopped, total
                );
                self.record(&mut outcomes, &target, RestartPhase::Verifying, false, 1);
            }
            Err(e) => {
                error!("Fleet status check failed, starting fleet anyway: {}", e);
                self.record(&mut outcomes, &target, RestartPhase::Verifying, false, 1);
            }
        }

        info!("Starting all instances");
        if let Err(e) = self.pm.start(&target).await {
            error!("Fleet start failed: {}", e);
            self.record(&mut outcomes, &target, RestartPhase::Starting, false, 1);
            return RestartReport {
                target,
                outcomes,
                result: RestartResult::Failed {
                    phase: RestartPhase::Starting,
                    reason: e.to_string(),
                },
            };
        }
        self.record(&mut outcomes, &target, RestartPhase::Starting, true, 1);

        info!("Fleet restart complete");
        RestartReport {
            target,
            outcomes,
            result: RestartResult::Completed,
        }
    }

    /// Number of configured instances the process manager reports as stopped
    pub async fn count_stopped(&self) -> Result<usize> {
        let entries = self.pm.status(&Target::All).await?;
        Ok(self
            .instances
            .iter()
            .filter(|instance| {
                entries.iter().any(|e| {
                    e.name == instance.id
                        && matches!(e.state, ProcessState::Stopped | ProcessState::Errored)
                })
            })
            .count())
    }
}
