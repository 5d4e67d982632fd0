use thiserror::Error;

/// Main error type for the fleet supervisor
#[derive(Error, Debug)]
pub enum WardenError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Validation(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Probe timed out after {secs}s")]
    ProbeTimeout { secs: u64 },

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Process manager errors
    #[error("Process manager command `{command}` failed: {reason}")]
    ProcessManager { command: String, reason: String },

    #[error("Process manager command `{command}` timed out after {secs}s")]
    CommandTimeout { command: String, secs: u64 },

    #[error("Could not parse process manager report: {0}")]
    Parse(String),

    #[error("Unknown instance: {0}")]
    UnknownInstance(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl WardenError {
    pub fn process_manager(command: impl Into<String>, reason: impl Into<String>) -> Self {
        WardenError::ProcessManager {
            command: command.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for WardenError
pub type Result<T> = std::result::Result<T, WardenError>;
