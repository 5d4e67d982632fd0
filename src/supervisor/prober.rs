//! Instance Health Prober
//!
//! Reads one worker's `prompt` status endpoint and extracts the pending
//! queue depth. Failures never escape as errors: they are recorded on the
//! returned sample so one unreachable worker cannot abort a polling round.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::FleetConfig;
use crate::domain::{HealthSample, Instance};
use crate::error::{Result, WardenError};

/// Anything that can produce a health sample for an instance
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, instance: &Instance) -> HealthSample;
}

#[derive(Debug, Default, Deserialize)]
struct PromptStatus {
    #[serde(default)]
    exec_info: ExecInfo,
}

#[derive(Debug, Default, Deserialize)]
struct ExecInfo {
    #[serde(default)]
    queue_remaining: u64,
}

/// Extract `exec_info.queue_remaining` from a status body; absent means 0
pub fn parse_queue_remaining(body: &str) -> Result<u64> {
    let status: PromptStatus = serde_json::from_str(body)?;
    Ok(status.exec_info.queue_remaining)
}

/// HTTP prober for the worker status endpoint
#[derive(Clone)]
pub struct HttpProber {
    client: Client,
    scheme: String,
    host: String,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(fleet: &FleetConfig, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            scheme: fleet.scheme.clone(),
            host: fleet.host.clone(),
            timeout,
        }
    }

    async fn fetch(&self, url: &str) -> Result<u64> {
        let request = async {
            let body = self
                .client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;
            parse_queue_remaining(&body)
        };

        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(WardenError::ProbeTimeout {
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

#[async_trait]
impl HealthProbe for HttpProber {
    async fn probe(&self, instance: &Instance) -> HealthSample {
        let url = instance.status_url(&self.scheme, &self.host);
        match self.fetch(&url).await {
            Ok(depth) => {
                debug!("{} queue_remaining={}", instance.id, depth);
                HealthSample::ok(&instance.id, depth)
            }
            Err(e) => HealthSample::failed(&instance.id, e.to_string()),
        }
    }
}
