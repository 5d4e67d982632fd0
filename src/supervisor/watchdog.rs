//! Queue Watchdog
//!
//! Polls every instance's queue depth on a fixed interval and restarts
//! instances that are alive but stuck (depth above threshold). Probes within
//! a tick run concurrently; restart decisions are taken only after all of
//! them finished or timed out.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::log_limiter::LogLimiter;
use super::prober::HealthProbe;
use super::restart::{RestartController, RestartReport, RestartResult};
use crate::config::WatchdogConfig;
use crate::coordination::ShutdownToken;
use crate::domain::{HealthSample, Instance};

/// Settings the watchdog loop needs
#[derive(Debug, Clone)]
pub struct WatchdogSettings {
    pub poll_interval: Duration,
    /// Restart when queue depth is strictly greater than this
    pub queue_threshold: u64,
    pub probe_timeout: Duration,
    pub log_every_n_ticks: u32,
}

impl From<&WatchdogConfig> for WatchdogSettings {
    fn from(config: &WatchdogConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            queue_threshold: config.queue_threshold,
            probe_timeout: config.probe_timeout(),
            log_every_n_ticks: config.log_every_n_ticks,
        }
    }
}

/// Event emitted by watchdog
#[derive(Debug, Clone)]
pub enum WatchdogEvent {
    /// Queue depth above threshold, restart being issued
    InstanceStuck { instance: String, queue_remaining: u64 },
    /// Probe failed; instance state unknown this tick
    ProbeFailed { instance: String, error: String },
    RestartSucceeded { instance: String },
    RestartFailed { instance: String, error: String },
    /// Restart refused because one is running or cooling down
    RestartSkipped { instance: String, reason: String },
}

/// Everything one tick observed and did
#[derive(Debug, Clone)]
pub struct TickReport {
    pub samples: Vec<HealthSample>,
    pub restarts: Vec<RestartReport>,
}

impl TickReport {
    /// Ids of instances a restart was issued or attempted for
    pub fn triggered(&self) -> Vec<&str> {
        self.restarts.iter().map(|r| r.target.as_str()).collect()
    }
}

/// Per-instance stuck detector
pub struct QueueWatchdog {
    settings: WatchdogSettings,
    instances: Vec<Instance>,
    probe: Arc<dyn HealthProbe>,
    controller: Arc<RestartController>,
    limiter: LogLimiter,
    event_tx: broadcast::Sender<WatchdogEvent>,
}

impl QueueWatchdog {
    pub fn new(
        settings: WatchdogSettings,
        probe: Arc<dyn HealthProbe>,
        controller: Arc<RestartController>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            limiter: LogLimiter::new(settings.log_every_n_ticks),
            instances: controller.instances().to_vec(),
            settings,
            probe,
            controller,
            event_tx,
        }
    }

    /// Subscribe to watchdog events
    pub fn subscribe(&self) -> broadcast::Receiver<WatchdogEvent> {
        self.event_tx.subscribe()
    }

    async fn probe_bounded(&self, instance: &Instance) -> HealthSample {
        match tokio::time::timeout(self.settings.probe_timeout, self.probe.probe(instance)).await {
            Ok(sample) => sample,
            Err(_) => HealthSample::failed(
                &instance.id,
                format!(
                    "probe timed out after {}s",
                    self.settings.probe_timeout.as_secs()
                ),
            ),
        }
    }

    /// Probe all instances concurrently (fan-out, fan-in)
    pub async fn probe_all(&self) -> Vec<HealthSample> {
        join_all(self.instances.iter().map(|i| self.probe_bounded(i))).await
    }

    /// Run one poll cycle
    pub async fn tick(&mut self) -> TickReport {
        let samples = self.probe_all().await;
        let threshold = self.settings.queue_threshold;

        let mut stuck = Vec::new();
        for sample in &samples {
            let id = sample.instance_id.as_str();
            if sample.exceeds(threshold) {
                let depth = sample.queue_remaining.unwrap_or_default();
                warn!(
                    "Instance {} queue_remaining={} exceeds threshold {}, restarting",
                    id, depth, threshold
                );
                let _ = self.event_tx.send(WatchdogEvent::InstanceStuck {
                    instance: id.to_string(),
                    queue_remaining: depth,
                });
                stuck.push(id.to_string());
                continue;
            }

            if let Some(err) = &sample.error {
                let _ = self.event_tx.send(WatchdogEvent::ProbeFailed {
                    instance: id.to_string(),
                    error: err.clone(),
                });
                if let Some(suppressed) = self.limiter.observe(id) {
                    warn!(
                        "Probe of {} failed: {} ({} similar suppressed)",
                        id, err, suppressed
                    );
                }
            } else if let Some(suppressed) = self.limiter.observe(id) {
                info!(
                    "Instance {} queue_remaining={} ({} samples since last report)",
                    id,
                    sample.queue_remaining.unwrap_or_default(),
                    suppressed
                );
            }
        }

        let controller = &self.controller;
        let results = join_all(stuck.iter().map(|id| controller.restart_instance(id))).await;

        let mut restarts = Vec::new();
        for (id, result) in stuck.iter().zip(results) {
            match result {
                Ok(report) => {
                    let event = match &report.result {
                        RestartResult::Completed => WatchdogEvent::RestartSucceeded {
                            instance: id.clone(),
                        },
                        RestartResult::Failed { phase, reason } => {
                            error!("Restart of {} failed while {}: {}", id, phase, reason);
                            WatchdogEvent::RestartFailed {
                                instance: id.clone(),
                                error: reason.clone(),
                            }
                        }
                        RestartResult::Skipped { reason } => WatchdogEvent::RestartSkipped {
                            instance: id.clone(),
                            reason: reason.clone(),
                        },
                    };
                    let _ = self.event_tx.send(event);
                    restarts.push(report);
                }
                Err(e) => {
                    error!("Restart of {} could not be issued: {}", id, e);
                    let _ = self.event_tx.send(WatchdogEvent::RestartFailed {
                        instance: id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        TickReport { samples, restarts }
    }

    /// Poll until shutdown. The first tick fires immediately.
    pub async fn run(mut self, mut shutdown: ShutdownToken) {
        info!(
            "Queue watchdog started: {} instances, threshold {}, every {}s",
            self.instances.len(),
            self.settings.queue_threshold,
            self.settings.poll_interval.as_secs()
        );

        let mut interval = tokio::time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let report = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        report = self.tick() => report,
                    };
                    debug!(
                        "Watchdog tick: {} samples, {} restarts",
                        report.samples.len(),
                        report.restarts.len()
                    );
                }
            }
        }

        info!("Queue watchdog stopped");
    }
}
