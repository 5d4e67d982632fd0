//! pm2 process manager adapter
//!
//! Drives the `pm2` CLI. Process state is read from `pm2 jlist`, whose JSON
//! carries full process names; the box-drawn `status` table truncates them.
//!
//! `Target::All` means the configured worker fleet, never pm2's own `all`,
//! so fleet restarts cannot stop the supervisor services registered
//! alongside the workers.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::process_manager::ProcessManager;
use crate::config::ProcessManagerConfig;
use crate::domain::{ProcessEntry, ProcessState, ServiceRegistration, Target};
use crate::error::{Result, WardenError};

/// Adapter that shells out to `pm2`
#[derive(Debug, Clone)]
pub struct Pm2Adapter {
    program: String,
    timeout: Duration,
    home: Option<PathBuf>,
    /// pm2 names of the worker instances `Target::All` expands to
    fleet: Vec<String>,
}

impl Pm2Adapter {
    pub fn new(config: &ProcessManagerConfig, fleet: Vec<String>) -> Self {
        Self {
            program: config.program.clone(),
            timeout: Duration::from_secs(config.command_timeout_secs),
            home: config.home.clone(),
            fleet,
        }
    }

    /// pm2 names a lifecycle command for `target` is addressed to
    fn names<'a>(&'a self, target: &'a Target) -> Vec<&'a str> {
        match target {
            Target::Named(name) => vec![name.as_str()],
            Target::All => self.fleet.iter().map(String::as_str).collect(),
        }
    }

    /// `pm2 <verb> name...` in one invocation
    async fn lifecycle(&self, verb: &str, target: &Target) -> Result<()> {
        let names = self.names(target);
        if names.is_empty() {
            debug!("No processes to {}", verb);
            return Ok(());
        }
        let mut args = vec![verb];
        args.extend(names);
        self.run(&args).await.map(|_| ())
    }

    async fn process_list(&self) -> Result<Vec<ProcessEntry>> {
        let report = self.run(&["jlist"]).await?;
        parse_jlist(&report)
    }

    /// Run one pm2 command and return its stdout
    async fn run(&self, args: &[&str]) -> Result<String> {
        let rendered = format!("{} {}", self.program, args.join(" "));
        debug!("Running: {}", rendered);

        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .env("FORCE_COLOR", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(home) = &self.home {
            cmd.env("PM2_HOME", home);
        }

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(WardenError::process_manager(rendered, e.to_string())),
            Err(_) => {
                return Err(WardenError::CommandTimeout {
                    command: rendered,
                    secs: self.timeout.as_secs(),
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = if stderr.trim().is_empty() {
                format!("{} ({})", output.status, stdout.trim())
            } else {
                format!("{} ({})", output.status, stderr.trim())
            };
            Err(WardenError::process_manager(rendered, reason))
        }
    }
}

#[async_trait]
impl ProcessManager for Pm2Adapter {
    async fn stop(&self, target: &Target) -> Result<()> {
        self.lifecycle("stop", target).await
    }

    async fn start(&self, target: &Target) -> Result<()> {
        self.lifecycle("start", target).await
    }

    async fn status(&self, target: &Target) -> Result<Vec<ProcessEntry>> {
        let entries = self.process_list().await?;
        Ok(match target {
            Target::All => entries,
            Target::Named(name) => entries.into_iter().filter(|e| &e.name == name).collect(),
        })
    }

    async fn describe(&self, name: &str) -> Result<Option<u32>> {
        Ok(self
            .process_list()
            .await?
            .into_iter()
            .find(|e| e.name == name)
            .and_then(|e| e.pid))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        match self.run(&["delete", name]).await {
            Ok(_) => Ok(()),
            Err(WardenError::ProcessManager { reason, .. }) if is_not_found(&reason) => {
                debug!("{} was not registered, nothing to delete", name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn start_service(&self, service: &ServiceRegistration) -> Result<()> {
        let script = service.script_path.to_string_lossy().into_owned();
        let cwd = service.working_dir.to_string_lossy().into_owned();
        let restart_delay = service.restart_delay_ms.to_string();

        let mut args: Vec<&str> = vec![
            "start",
            &script,
            "--name",
            &service.name,
            "--cwd",
            &cwd,
            "--max-memory-restart",
            &service.max_memory,
            "--restart-delay",
            &restart_delay,
            "--interpreter",
            "none",
        ];
        if !service.args.is_empty() {
            args.push("--");
            args.extend(service.args.iter().map(String::as_str));
        }

        self.run(&args).await.map(|_| ())
    }

    async fn save(&self) -> Result<()> {
        self.run(&["save"]).await.map(|_| ())
    }

    async fn kill_daemon(&self) -> Result<()> {
        self.run(&["kill"]).await.map(|_| ())
    }
}

fn is_not_found(reason: &str) -> bool {
    let reason = reason.to_ascii_lowercase();
    reason.contains("not found") || reason.contains("doesn't exist") || reason.contains("does not exist")
}

#[derive(Debug, Deserialize)]
struct JlistProcess {
    name: String,
    #[serde(default)]
    pid: Option<u64>,
    #[serde(default)]
    pm2_env: JlistEnv,
}

#[derive(Debug, Default, Deserialize)]
struct JlistEnv {
    #[serde(default)]
    status: String,
}

impl From<JlistProcess> for ProcessEntry {
    fn from(p: JlistProcess) -> Self {
        ProcessEntry {
            state: ProcessState::parse(&p.pm2_env.status).unwrap_or(ProcessState::Unknown),
            pid: p
                .pid
                .filter(|pid| *pid > 0)
                .and_then(|pid| u32::try_from(pid).ok()),
            name: p.name,
        }
    }
}

/// Parse `pm2 jlist` output.
///
/// pm2 may print daemon notices before the JSON array, so the last line
/// holding an array is taken.
pub fn parse_jlist(report: &str) -> Result<Vec<ProcessEntry>> {
    let line = report
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with('[') && l.ends_with(']') && !l.starts_with("[PM2"))
        .ok_or_else(|| WardenError::Parse("no process list in `pm2 jlist` output".to_string()))?;
    let processes: Vec<JlistProcess> = serde_json::from_str(line)?;
    Ok(processes.into_iter().map(ProcessEntry::from).collect())
}
