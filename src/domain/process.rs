use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Target of a process-manager lifecycle command
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// A single named entry
    Named(String),
    /// Every entry the process manager knows about
    All,
}

impl Target {
    pub fn named(name: impl Into<String>) -> Self {
        Target::Named(name.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Target::Named(name) => name,
            Target::All => "all",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Target {
    fn from(s: &str) -> Self {
        if s.eq_ignore_ascii_case("all") {
            Target::All
        } else {
            Target::Named(s.to_string())
        }
    }
}

/// Lifecycle state reported by the process manager for one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Online,
    Stopped,
    Stopping,
    Launching,
    Errored,
    Unknown,
}

impl ProcessState {
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "online" => Some(ProcessState::Online),
            "stopped" => Some(ProcessState::Stopped),
            "stopping" => Some(ProcessState::Stopping),
            "launching" => Some(ProcessState::Launching),
            "errored" => Some(ProcessState::Errored),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Online | ProcessState::Launching | ProcessState::Stopping)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Online => write!(f, "online"),
            ProcessState::Stopped => write!(f, "stopped"),
            ProcessState::Stopping => write!(f, "stopping"),
            ProcessState::Launching => write!(f, "launching"),
            ProcessState::Errored => write!(f, "errored"),
            ProcessState::Unknown => write!(f, "unknown"),
        }
    }
}

/// One row of a process-manager status report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub name: String,
    pub state: ProcessState,
    /// OS process id; absent or zero when the entry is not running
    pub pid: Option<u32>,
}

/// Phase of a restart sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RestartPhase {
    Stopping,
    Verifying,
    Starting,
}

impl fmt::Display for RestartPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartPhase::Stopping => write!(f, "stopping"),
            RestartPhase::Verifying => write!(f, "verifying"),
            RestartPhase::Starting => write!(f, "starting"),
        }
    }
}

/// Result of one step of a stop/verify/start sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartOutcome {
    pub target: Target,
    pub phase: RestartPhase,
    pub success: bool,
    /// 1-based attempt number within the phase
    pub attempt: u32,
}

/// Declarative registration of a supervised long-lived service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRegistration {
    pub name: String,
    pub script_path: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Memory ceiling in process-manager notation, e.g. `200M`
    pub max_memory: String,
    pub restart_delay_ms: u64,
}
