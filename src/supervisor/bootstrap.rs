//! Supervisor Bootstrap
//!
//! Makes sure the watchdog and sweeper services themselves are running under
//! the process manager. A service counts as up only when the manager reports
//! it `online` and the pid it recorded belongs to a live OS process.
//!
//! Cleanup comes in two strengths. The gentle path only deletes the known
//! service registrations. The full path kills the manager daemon and clears
//! its temp state; it is only taken when no worker instance is running.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::adapters::ProcessManager;
use crate::config::{AppConfig, BootstrapConfig};
use crate::domain::{ProcessState, ServiceRegistration, Target};

#[derive(Debug, Clone)]
pub struct BootstrapSettings {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Pause after a fresh start before verifying it
    pub settle_delay: Duration,
}

impl From<&BootstrapConfig> for BootstrapSettings {
    fn from(config: &BootstrapConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            settle_delay: Duration::from_secs(config.settle_delay_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupMode {
    /// Nothing needed fixing
    None,
    /// Only the service registrations were touched
    Gentle,
    /// Daemon killed and temp state cleared
    Full,
}

/// Why a service failed verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Online { pid: u32 },
    NotRegistered,
    NotOnline(ProcessState),
    NoPid,
    PidDead(u32),
    Error(String),
}

impl Verification {
    pub fn is_online(&self) -> bool {
        matches!(self, Verification::Online { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub name: String,
    pub online: bool,
    pub pid: Option<u32>,
    /// Fresh starts issued for this service
    pub starts: u32,
}

#[derive(Debug, Clone)]
pub struct BootstrapSummary {
    pub cleanup: CleanupMode,
    pub services: Vec<ServiceStatus>,
    pub saved: bool,
}

impl BootstrapSummary {
    pub fn all_online(&self) -> bool {
        self.services.iter().all(|s| s.online)
    }
}

/// Registrations for the watchdog and sweeper, running this binary
pub fn service_registrations(
    config: &AppConfig,
    executable: &Path,
    config_dir: &Path,
) -> Vec<ServiceRegistration> {
    let working_dir = config
        .bootstrap
        .working_dir
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    [
        (&config.bootstrap.watchdog_name, "watchdog"),
        (&config.bootstrap.sweeper_name, "sweeper"),
    ]
    .into_iter()
    .map(|(name, subcommand)| ServiceRegistration {
        name: name.clone(),
        script_path: executable.to_path_buf(),
        args: vec![
            "--config-dir".to_string(),
            config_dir.to_string_lossy().into_owned(),
            subcommand.to_string(),
        ],
        working_dir: working_dir.clone(),
        max_memory: config.bootstrap.max_memory.clone(),
        restart_delay_ms: config.bootstrap.restart_delay_ms,
    })
    .collect()
}

/// Remove the daemon's pid files and sockets. Returns how many were removed.
pub fn clear_daemon_state(home: &Path) -> std::io::Result<usize> {
    let mut removed = 0;

    let pids = home.join("pids");
    match std::fs::read_dir(&pids) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() {
                    std::fs::remove_file(&path)?;
                    removed += 1;
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    for socket in ["rpc.sock", "pub.sock"] {
        match std::fs::remove_file(home.join(socket)) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }

    Ok(removed)
}

pub struct SupervisorBootstrap {
    pm: Arc<dyn ProcessManager>,
    services: Vec<ServiceRegistration>,
    instance_ids: Vec<String>,
    settings: BootstrapSettings,
    pm_home: Option<PathBuf>,
}

impl SupervisorBootstrap {
    pub fn new(
        pm: Arc<dyn ProcessManager>,
        services: Vec<ServiceRegistration>,
        instance_ids: Vec<String>,
        settings: BootstrapSettings,
        pm_home: Option<PathBuf>,
    ) -> Self {
        Self {
            pm,
            services,
            instance_ids,
            settings,
            pm_home,
        }
    }

    /// Check one service: `online` in the status report and a live pid
    pub async fn verify(&self, name: &str) -> Verification {
        let entries = match self.pm.status(&Target::named(name)).await {
            Ok(entries) => entries,
            Err(e) => return Verification::Error(e.to_string()),
        };
        let Some(entry) = entries.iter().find(|e| e.name == name) else {
            return Verification::NotRegistered;
        };
        if entry.state != ProcessState::Online {
            return Verification::NotOnline(entry.state);
        }

        let pid = match self.pm.describe(name).await {
            Ok(Some(pid)) => pid,
            Ok(None) => match entry.pid {
                Some(pid) => pid,
                None => return Verification::NoPid,
            },
            Err(e) => return Verification::Error(e.to_string()),
        };

        if self.pm.pid_alive(pid) {
            Verification::Online { pid }
        } else {
            Verification::PidDead(pid)
        }
    }

    /// Whether any configured worker instance is currently running.
    /// An unreadable status counts as running so the full path is never
    /// taken blind.
    pub async fn workers_running(&self) -> bool {
        match self.pm.status(&Target::All).await {
            Ok(entries) => entries
                .iter()
                .any(|e| self.instance_ids.contains(&e.name) && e.state.is_running()),
            Err(e) => {
                warn!("Cannot read process list, assuming workers are live: {}", e);
                true
            }
        }
    }

    async fn full_cleanup(&self) {
        warn!("No workers running: killing process manager daemon and clearing its state");
        if let Err(e) = self.pm.kill_daemon().await {
            error!("Failed to kill process manager daemon: {}", e);
        }
        match &self.pm_home {
            Some(home) => match clear_daemon_state(home) {
                Ok(removed) => info!("Cleared {} daemon state files in {}", removed, home.display()),
                Err(e) => error!("Failed to clear daemon state in {}: {}", home.display(), e),
            },
            None => warn!("Process manager home unknown, daemon state not cleared"),
        }
    }

    async fn remove_registration(&self, name: &str) {
        if let Err(e) = self.pm.stop(&Target::named(name)).await {
            warn!("Stop of {} before re-registration failed: {}", name, e);
        }
        if let Err(e) = self.pm.delete(name).await {
            warn!("Delete of {} failed: {}", name, e);
        }
    }

    /// Bring one service up, retrying up to the attempt budget
    async fn ensure_service(&self, service: &ServiceRegistration, registered: bool) -> ServiceStatus {
        let mut starts = 0;

        for attempt in 1..=self.settings.max_attempts {
            if registered || attempt > 1 {
                self.remove_registration(&service.name).await;
            }

            info!(
                "Starting {} (attempt {}/{})",
                service.name, attempt, self.settings.max_attempts
            );
            starts += 1;
            match self.pm.start_service(service).await {
                Ok(()) => {
                    tokio::time::sleep(self.settings.settle_delay).await;
                    match self.verify(&service.name).await {
                        Verification::Online { pid } => {
                            info!("{} online with pid {}", service.name, pid);
                            return ServiceStatus {
                                name: service.name.clone(),
                                online: true,
                                pid: Some(pid),
                                starts,
                            };
                        }
                        other => warn!("{} not healthy after start: {:?}", service.name, other),
                    }
                }
                Err(e) => error!("Start of {} failed: {}", service.name, e),
            }

            if attempt < self.settings.max_attempts {
                tokio::time::sleep(self.settings.retry_delay).await;
            }
        }

        error!(
            "{} still offline after {} attempts",
            service.name, self.settings.max_attempts
        );
        ServiceStatus {
            name: service.name.clone(),
            online: false,
            pid: None,
            starts,
        }
    }

    /// Verify every service, repair what is down, persist the result
    pub async fn run(&self) -> BootstrapSummary {
        let mut initial = Vec::with_capacity(self.services.len());
        for service in &self.services {
            let verification = self.verify(&service.name).await;
            info!("{}: {:?}", service.name, verification);
            initial.push(verification);
        }

        let mut cleanup = CleanupMode::None;
        if !initial.iter().all(Verification::is_online) {
            if self.workers_running().await {
                info!("Workers are live, using gentle cleanup");
                cleanup = CleanupMode::Gentle;
            } else {
                self.full_cleanup().await;
                cleanup = CleanupMode::Full;
            }
        }

        let mut services = Vec::with_capacity(self.services.len());
        for (service, verification) in self.services.iter().zip(initial) {
            let status = match verification {
                // A full cleanup killed everything, including healthy services
                Verification::Online { pid } if cleanup != CleanupMode::Full => ServiceStatus {
                    name: service.name.clone(),
                    online: true,
                    pid: Some(pid),
                    starts: 0,
                },
                Verification::NotRegistered => self.ensure_service(service, false).await,
                _ if cleanup == CleanupMode::Full => self.ensure_service(service, false).await,
                _ => self.ensure_service(service, true).await,
            };
            services.push(status);
        }

        let mut saved = false;
        if services.iter().any(|s| s.online) {
            match self.pm.save().await {
                Ok(()) => saved = true,
                Err(e) => error!("Failed to persist process list: {}", e),
            }
        }

        for s in &services {
            if s.online {
                info!("Service {}: online (pid {:?})", s.name, s.pid);
            } else {
                error!("Service {}: OFFLINE after {} starts", s.name, s.starts);
            }
        }

        BootstrapSummary {
            cleanup,
            services,
            saved,
        }
    }
}
