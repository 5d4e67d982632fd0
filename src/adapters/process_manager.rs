//! Process manager seam
//!
//! The supervisor never forks or kills worker processes itself. It issues
//! lifecycle commands through this trait and reads back the manager's view
//! of each entry.

use async_trait::async_trait;

use crate::domain::{ProcessEntry, ServiceRegistration, Target};
use crate::error::Result;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessManager: Send + Sync {
    /// Stop one entry or the whole worker fleet (stop-if-running).
    /// `Target::All` never reaches entries outside the fleet.
    async fn stop(&self, target: &Target) -> Result<()>;

    /// Start one entry or the whole worker fleet (start-if-not-running)
    async fn start(&self, target: &Target) -> Result<()>;

    /// Status report rows for the target
    async fn status(&self, target: &Target) -> Result<Vec<ProcessEntry>>;

    /// Process id the manager has recorded for `name`, if any
    async fn describe(&self, name: &str) -> Result<Option<u32>>;

    /// Remove the registration for `name`; succeeds when it did not exist
    async fn delete(&self, name: &str) -> Result<()>;

    /// Register and start a supervised service
    async fn start_service(&self, service: &ServiceRegistration) -> Result<()>;

    /// Persist the current process list so it is resurrected after reboot
    async fn save(&self) -> Result<()>;

    /// Kill the process manager daemon itself
    async fn kill_daemon(&self) -> Result<()>;

    /// Whether an OS process with this pid exists
    fn pid_alive(&self, pid: u32) -> bool {
        pid_alive(pid)
    }
}

/// Signal-0 liveness probe.
#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    if pid == 0 {
        return false;
    }
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        // Exists but owned by another user
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub fn pid_alive(pid: u32) -> bool {
    pid != 0
}
