use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A configured worker process.
///
/// The instance id doubles as the process-manager entry name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    /// Port the worker listens on behind the reverse proxy
    pub port: u16,
    /// URL path prefix routed to this worker, e.g. `/comfy1/`
    pub path_prefix: String,
}

impl Instance {
    pub fn new(id: impl Into<String>, port: u16, path_prefix: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            port,
            path_prefix: path_prefix.into(),
        }
    }

    /// Status endpoint for this instance: `<scheme>://<host><path_prefix>prompt`
    pub fn status_url(&self, scheme: &str, host: &str) -> String {
        format!("{}://{}{}prompt", scheme, host, self.path_prefix)
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (:{}{})", self.id, self.port, self.path_prefix)
    }
}

/// Result of probing one instance's status endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSample {
    pub instance_id: String,
    pub queue_remaining: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

impl HealthSample {
    pub fn ok(instance_id: &str, queue_remaining: u64) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            queue_remaining: Some(queue_remaining),
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn failed(instance_id: &str, error: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            queue_remaining: None,
            timestamp: Utc::now(),
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// True only for a successful sample whose queue depth is strictly above `threshold`.
    /// Errored samples are "unknown" and never exceed.
    pub fn exceeds(&self, threshold: u64) -> bool {
        matches!(self.queue_remaining, Some(depth) if self.error.is_none() && depth > threshold)
    }
}
