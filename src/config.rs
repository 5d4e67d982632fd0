use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::Instance;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub fleet: FleetConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub restart: RestartConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub process_manager: ProcessManagerConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FleetConfig {
    /// Public host used to build probe URLs (may include `:port`)
    pub host: String,
    /// URL scheme for probes
    #[serde(default = "default_scheme")]
    pub scheme: String,
    pub instances: Vec<Instance>,
}

fn default_scheme() -> String {
    "https".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Restart when queue depth is strictly greater than this
    #[serde(default = "default_queue_threshold")]
    pub queue_threshold: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// Non-triggering samples are logged once every N ticks per instance
    #[serde(default = "default_log_every")]
    pub log_every_n_ticks: u32,
    /// Lockout after a per-instance restart completes (0 = in-flight exclusion only)
    #[serde(default = "default_cooldown")]
    pub restart_cooldown_secs: u64,
}

fn default_poll_interval() -> u64 {
    30
}

fn default_queue_threshold() -> u64 {
    5
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_log_every() -> u32 {
    10
}

fn default_cooldown() -> u64 {
    60
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            queue_threshold: default_queue_threshold(),
            probe_timeout_secs: default_probe_timeout(),
            log_every_n_ticks: default_log_every(),
            restart_cooldown_secs: default_cooldown(),
        }
    }
}

impl WatchdogConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn restart_cooldown(&self) -> Duration {
        Duration::from_secs(self.restart_cooldown_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestartConfig {
    /// Pause between stop and start of a single instance
    #[serde(default = "default_instance_settle")]
    pub instance_settle_secs: u64,
    /// Pause between fleet stop and fleet verification
    #[serde(default = "default_fleet_settle")]
    pub fleet_settle_secs: u64,
    #[serde(default = "default_stop_confirm_attempts")]
    pub stop_confirm_attempts: u32,
    #[serde(default = "default_stop_confirm_delay")]
    pub stop_confirm_delay_secs: u64,
}

fn default_instance_settle() -> u64 {
    2
}

fn default_fleet_settle() -> u64 {
    3
}

fn default_stop_confirm_attempts() -> u32 {
    3
}

fn default_stop_confirm_delay() -> u64 {
    1
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            instance_settle_secs: default_instance_settle(),
            fleet_settle_secs: default_fleet_settle(),
            stop_confirm_attempts: default_stop_confirm_attempts(),
            stop_confirm_delay_secs: default_stop_confirm_delay(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Run the scheduled full-fleet restart alongside the watchdog
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_full_restart_interval")]
    pub full_restart_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_full_restart_interval() -> u64 {
    2 * 60 * 60
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            full_restart_interval_secs: default_full_restart_interval(),
        }
    }
}

impl ScheduleConfig {
    pub fn full_restart_interval(&self) -> Duration {
        Duration::from_secs(self.full_restart_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Files strictly older than this are deleted
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
    /// Allowed extensions, without the leading dot, case-insensitive
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Main output, temp and nested output/temp directories
    #[serde(default)]
    pub directories: Vec<PathBuf>,
}

fn default_sweep_interval() -> u64 {
    10 * 60
}

fn default_max_age() -> u64 {
    20 * 60
}

fn default_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            max_age_secs: default_max_age(),
            extensions: default_extensions(),
            directories: Vec::new(),
        }
    }
}

impl RetentionConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessManagerConfig {
    /// Process manager executable
    #[serde(default = "default_pm_program")]
    pub program: String,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Process manager home directory (defaults to $PM2_HOME, then ~/.pm2)
    #[serde(default)]
    pub home: Option<PathBuf>,
}

fn default_pm_program() -> String {
    "pm2".to_string()
}

fn default_command_timeout() -> u64 {
    30
}

impl Default for ProcessManagerConfig {
    fn default() -> Self {
        Self {
            program: default_pm_program(),
            command_timeout_secs: default_command_timeout(),
            home: None,
        }
    }
}

impl ProcessManagerConfig {
    pub fn resolved_home(&self) -> Option<PathBuf> {
        self.home
            .clone()
            .or_else(|| std::env::var_os("PM2_HOME").map(PathBuf::from))
            .or_else(|| dirs::home_dir().map(|h| h.join(".pm2")))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default = "default_bootstrap_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_bootstrap_retry_delay")]
    pub retry_delay_secs: u64,
    /// Pause after a fresh start before verifying it
    #[serde(default = "default_bootstrap_settle")]
    pub settle_delay_secs: u64,
    /// Working directory declared for supervised services
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default = "default_max_memory")]
    pub max_memory: String,
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
    #[serde(default = "default_watchdog_name")]
    pub watchdog_name: String,
    #[serde(default = "default_sweeper_name")]
    pub sweeper_name: String,
}

fn default_bootstrap_attempts() -> u32 {
    5
}

fn default_bootstrap_retry_delay() -> u64 {
    3
}

fn default_bootstrap_settle() -> u64 {
    2
}

fn default_max_memory() -> String {
    "200M".to_string()
}

fn default_restart_delay_ms() -> u64 {
    5000
}

fn default_watchdog_name() -> String {
    "queue-watchdog".to_string()
}

fn default_sweeper_name() -> String {
    "artifact-sweeper".to_string()
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_bootstrap_attempts(),
            retry_delay_secs: default_bootstrap_retry_delay(),
            settle_delay_secs: default_bootstrap_settle(),
            working_dir: None,
            max_memory: default_max_memory(),
            restart_delay_ms: default_restart_delay_ms(),
            watchdog_name: default_watchdog_name(),
            sweeper_name: default_sweeper_name(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory holding one `<service>.log` per long-lived service
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: default_log_dir(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("fleet.scheme", "https")?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("WARDEN_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (WARDEN__FLEET__HOST, etc.)
            .add_source(
                Environment::with_prefix("WARDEN")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Parse configuration from a TOML string (used by tests and `--config` snippets)
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    pub fn instance(&self, id: &str) -> Option<&Instance> {
        self.fleet.instances.iter().find(|i| i.id == id)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.fleet.host.trim().is_empty() {
            errors.push("fleet.host must not be empty".to_string());
        }

        if self.fleet.instances.is_empty() {
            errors.push("fleet.instances must list at least one instance".to_string());
        }

        let mut seen = HashSet::new();
        for instance in &self.fleet.instances {
            if instance.id.trim().is_empty() {
                errors.push("instance id must not be empty".to_string());
            } else if instance.id.eq_ignore_ascii_case("all") {
                errors.push("instance id `all` is reserved for fleet-wide commands".to_string());
            }
            if !seen.insert(instance.id.as_str()) {
                errors.push(format!("duplicate instance id: {}", instance.id));
            }
            if !instance.path_prefix.starts_with('/') || !instance.path_prefix.ends_with('/') {
                errors.push(format!(
                    "instance {} path_prefix must start and end with '/': {}",
                    instance.id, instance.path_prefix
                ));
            }
        }

        if self.watchdog.poll_interval_secs == 0 {
            errors.push("watchdog.poll_interval_secs must be positive".to_string());
        }

        if self.watchdog.probe_timeout_secs == 0 {
            errors.push("watchdog.probe_timeout_secs must be positive".to_string());
        }

        if self.watchdog.probe_timeout_secs >= self.watchdog.poll_interval_secs {
            errors.push(
                "watchdog.probe_timeout_secs should be less than poll_interval_secs".to_string(),
            );
        }

        if self.schedule.full_restart_interval_secs == 0 {
            errors.push("schedule.full_restart_interval_secs must be positive".to_string());
        }

        if self.retention.sweep_interval_secs == 0 {
            errors.push("retention.sweep_interval_secs must be positive".to_string());
        }

        if self.retention.extensions.is_empty() {
            errors.push("retention.extensions must not be empty".to_string());
        }

        if self.retention.directories.is_empty() {
            errors.push(
                "retention.directories must list the output and temp directories to sweep"
                    .to_string(),
            );
        }

        if self.bootstrap.max_attempts == 0 {
            errors.push("bootstrap.max_attempts must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
