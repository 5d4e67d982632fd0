//! Drives the real pm2 adapter against a shell script standing in for `pm2`.
//! The script appends its argv to `$PM2_HOME/calls.log` and answers `jlist`
//! from `$PM2_HOME/jlist.json`.
#![cfg(unix)]

use fleetwarden::adapters::{Pm2Adapter, ProcessManager};
use fleetwarden::config::ProcessManagerConfig;
use fleetwarden::domain::{Instance, ProcessState, ServiceRegistration, Target};
use fleetwarden::supervisor::{
    BootstrapSettings, CleanupMode, RestartController, RestartTiming, SupervisorBootstrap,
};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tempfile::TempDir;

const FAKE_PM2: &str = r#"#!/bin/sh
echo "$*" >> "$PM2_HOME/calls.log"
if [ "$1" = "jlist" ]; then
  echo ">>>> In-memory PM2 is out-of-date, do:"
  cat "$PM2_HOME/jlist.json"
fi
exit 0
"#;

// Writing an executable while another test forks can fail with ETXTBSY
static EXEC_LOCK: Mutex<()> = Mutex::new(());

struct FakePm2 {
    home: TempDir,
    _lock: MutexGuard<'static, ()>,
}

impl FakePm2 {
    fn new(jlist: &str) -> Self {
        let lock = EXEC_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let home = tempfile::tempdir().unwrap();
        let script = home.path().join("pm2");
        std::fs::write(&script, FAKE_PM2).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::write(home.path().join("jlist.json"), jlist).unwrap();
        Self { home, _lock: lock }
    }

    fn adapter(&self, fleet: &[&str]) -> Pm2Adapter {
        let config = ProcessManagerConfig {
            program: self.home.path().join("pm2").to_string_lossy().into_owned(),
            command_timeout_secs: 10,
            home: Some(self.home.path().to_path_buf()),
        };
        Pm2Adapter::new(&config, fleet.iter().map(|s| s.to_string()).collect())
    }

    fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.home.path().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn jlist(entries: &[(&str, u32, &str)]) -> String {
    let items: Vec<String> = entries
        .iter()
        .map(|(name, pid, status)| {
            format!(r#"{{"pid":{pid},"name":"{name}","pm_id":0,"pm2_env":{{"status":"{status}"}}}}"#)
        })
        .collect();
    format!("[{}]", items.join(","))
}

fn instances(ids: &[&str]) -> Vec<Instance> {
    ids.iter()
        .zip(1u16..)
        .map(|(id, n)| Instance::new(*id, 8187 + n, format!("/comfy{n}/")))
        .collect()
}

fn registration(name: &str, subcommand: &str) -> ServiceRegistration {
    ServiceRegistration {
        name: name.to_string(),
        script_path: PathBuf::from("/usr/local/bin/fleetwarden"),
        args: vec![subcommand.to_string()],
        working_dir: PathBuf::from("/srv/warden"),
        max_memory: "200M".to_string(),
        restart_delay_ms: 5000,
    }
}

#[tokio::test]
async fn fleet_restart_never_touches_supervisor_services() {
    let pm2 = FakePm2::new(&jlist(&[
        ("comfyui-1", 4121, "online"),
        ("comfyui-2", 4122, "online"),
        ("queue-watchdog", 4188, "online"),
        ("artifact-sweeper", 4190, "online"),
    ]));
    let adapter: Arc<dyn ProcessManager> = Arc::new(pm2.adapter(&["comfyui-1", "comfyui-2"]));
    let controller = RestartController::new(
        adapter,
        instances(&["comfyui-1", "comfyui-2"]),
        RestartTiming::immediate(),
    );

    controller.restart_all().await;

    let calls = pm2.calls();
    assert_eq!(
        calls,
        vec!["stop comfyui-1 comfyui-2", "jlist", "start comfyui-1 comfyui-2"]
    );
    for call in &calls {
        assert!(!call.contains("queue-watchdog"), "{call}");
        assert!(!call.contains("artifact-sweeper"), "{call}");
        assert!(!call.split_whitespace().any(|arg| arg == "all"), "{call}");
    }
}

#[tokio::test]
async fn status_reports_full_names_of_long_registrations() {
    let pm2 = FakePm2::new(&jlist(&[
        ("comfyui-1", 0, "stopped"),
        ("queue-watchdog", 4188, "online"),
    ]));
    let adapter = pm2.adapter(&["comfyui-1"]);

    let entries = adapter.status(&Target::named("queue-watchdog")).await.unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].state, ProcessState::Online);
    assert_eq!(adapter.describe("queue-watchdog").await.unwrap(), Some(4188));
    assert_eq!(adapter.describe("comfyui-1").await.unwrap(), None);
}

#[tokio::test]
async fn bootstrap_accepts_healthy_long_named_services() {
    let own_pid = std::process::id();
    let pm2 = FakePm2::new(&jlist(&[
        ("comfyui-1", 4121, "online"),
        ("queue-watchdog", own_pid, "online"),
        ("artifact-sweeper", own_pid, "online"),
    ]));
    let adapter: Arc<dyn ProcessManager> = Arc::new(pm2.adapter(&["comfyui-1"]));
    let supervisor = SupervisorBootstrap::new(
        adapter,
        vec![
            registration("queue-watchdog", "watchdog"),
            registration("artifact-sweeper", "sweeper"),
        ],
        vec!["comfyui-1".to_string()],
        BootstrapSettings {
            max_attempts: 5,
            retry_delay: Duration::ZERO,
            settle_delay: Duration::ZERO,
        },
        Some(pm2.home.path().to_path_buf()),
    );

    let summary = supervisor.run().await;

    assert_eq!(summary.cleanup, CleanupMode::None);
    assert!(summary.all_online());
    assert!(summary.services.iter().all(|s| s.starts == 0));
    let calls = pm2.calls();
    assert!(!calls.iter().any(|c| c.starts_with("start") || c.starts_with("delete") || c == "kill"));
    assert_eq!(calls.last().map(String::as_str), Some("save"));
}
