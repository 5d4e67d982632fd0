#![allow(dead_code)]

use async_trait::async_trait;
use fleetwarden::adapters::ProcessManager;
use fleetwarden::domain::{Instance, ProcessEntry, ProcessState, ServiceRegistration, Target};
use fleetwarden::error::{Result, WardenError};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

/// A lifecycle command as the fake received it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Stop(String),
    Start(String),
    Status(String),
    Describe(String),
    Delete(String),
    StartService(String),
    Save,
    Kill,
}

#[derive(Debug, Default)]
struct Inner {
    calls: Vec<Call>,
    entries: BTreeMap<String, (ProcessState, Option<u32>)>,
    next_pid: u32,
}

/// In-memory process manager that records every command
#[derive(Debug, Default)]
pub struct FakeProcessManager {
    inner: Mutex<Inner>,
    /// Entries that ignore stop commands
    stuck: HashSet<String>,
    /// Entries whose start_service never comes up
    broken_services: HashSet<String>,
    /// Pids reported dead by the liveness check
    dead_pids: Mutex<HashSet<u32>>,
}

impl FakeProcessManager {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.inner.lock().unwrap().next_pid = 1000;
        fake
    }

    /// Fake with every instance registered and online
    pub fn with_online(instances: &[Instance]) -> Self {
        let fake = Self::new();
        for instance in instances {
            fake.set(&instance.id, ProcessState::Online);
        }
        fake
    }

    /// Named entry ignores stop commands
    pub fn with_stuck(mut self, name: &str) -> Self {
        self.stuck.insert(name.to_string());
        self
    }

    /// Named service lands in `errored` on every start
    pub fn with_broken_service(mut self, name: &str) -> Self {
        self.broken_services.insert(name.to_string());
        self
    }

    pub fn kill_pid(&self, pid: u32) {
        self.dead_pids.lock().unwrap().insert(pid);
    }

    pub fn set(&self, name: &str, state: ProcessState) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_pid += 1;
        let pid = if state == ProcessState::Online {
            Some(inner.next_pid)
        } else {
            None
        };
        inner.entries.insert(name.to_string(), (state, pid));
    }

    pub fn state(&self, name: &str) -> Option<ProcessState> {
        self.inner.lock().unwrap().entries.get(name).map(|(s, _)| *s)
    }

    pub fn pid(&self, name: &str) -> Option<u32> {
        self.inner.lock().unwrap().entries.get(name).and_then(|(_, p)| *p)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Only stop/start commands, in order
    pub fn lifecycle_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Stop(_) | Call::Start(_)))
            .collect()
    }

    fn record(&self, call: Call) {
        self.inner.lock().unwrap().calls.push(call);
    }

    fn transition(&self, target: &Target, state: ProcessState) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let names: Vec<String> = match target {
            Target::All => inner.entries.keys().cloned().collect(),
            Target::Named(name) => {
                if !inner.entries.contains_key(name) {
                    return Err(WardenError::process_manager(
                        format!("pm2 {state} {name}"),
                        "process not found",
                    ));
                }
                vec![name.clone()]
            }
        };
        for name in names {
            if state == ProcessState::Stopped && self.stuck.contains(&name) {
                continue;
            }
            inner.next_pid += 1;
            let pid = (state == ProcessState::Online).then_some(inner.next_pid);
            inner.entries.insert(name, (state, pid));
        }
        Ok(())
    }
}

#[async_trait]
impl ProcessManager for FakeProcessManager {
    async fn stop(&self, target: &Target) -> Result<()> {
        self.record(Call::Stop(target.to_string()));
        self.transition(target, ProcessState::Stopped)
    }

    async fn start(&self, target: &Target) -> Result<()> {
        self.record(Call::Start(target.to_string()));
        self.transition(target, ProcessState::Online)
    }

    async fn status(&self, target: &Target) -> Result<Vec<ProcessEntry>> {
        self.record(Call::Status(target.to_string()));
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .entries
            .iter()
            .filter(|(name, _)| match target {
                Target::All => true,
                Target::Named(n) => n == *name,
            })
            .map(|(name, (state, pid))| ProcessEntry {
                name: name.clone(),
                state: *state,
                pid: *pid,
            })
            .collect())
    }

    async fn describe(&self, name: &str) -> Result<Option<u32>> {
        self.record(Call::Describe(name.to_string()));
        Ok(self.pid(name))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.record(Call::Delete(name.to_string()));
        self.inner.lock().unwrap().entries.remove(name);
        Ok(())
    }

    async fn start_service(&self, service: &ServiceRegistration) -> Result<()> {
        self.record(Call::StartService(service.name.clone()));
        let state = if self.broken_services.contains(&service.name) {
            ProcessState::Errored
        } else {
            ProcessState::Online
        };
        self.set(&service.name, state);
        Ok(())
    }

    async fn save(&self) -> Result<()> {
        self.record(Call::Save);
        Ok(())
    }

    async fn kill_daemon(&self) -> Result<()> {
        self.record(Call::Kill);
        self.inner.lock().unwrap().entries.clear();
        Ok(())
    }

    fn pid_alive(&self, pid: u32) -> bool {
        !self.dead_pids.lock().unwrap().contains(&pid)
    }
}

pub fn fleet(n: u16) -> Vec<Instance> {
    (1..=n)
        .map(|i| Instance::new(i.to_string(), 8187 + i, format!("/comfy{i}/")))
        .collect()
}
