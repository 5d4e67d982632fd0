mod main_runtime;

use anyhow::{anyhow, Context};
use clap::Parser;
use fleetwarden::adapters::{Pm2Adapter, ProcessManager};
use fleetwarden::cli::{Cli, Commands};
use fleetwarden::config::AppConfig;
use fleetwarden::coordination::Shutdown;
use fleetwarden::domain::Target;
use fleetwarden::error::WardenError;
use fleetwarden::supervisor::{
    bootstrap, BootstrapSettings, HttpProber, QueueWatchdog, RestartController, RestartScheduler,
    RestartTiming, RetentionSweeper, SupervisorBootstrap, WatchdogSettings,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use main_runtime::{init_logging, shutdown_signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // The only fatal error: configuration that cannot be read or is invalid
    let config = AppConfig::load_from(&cli.config_dir)
        .with_context(|| format!("loading configuration from {}", cli.config_dir.display()))?;
    config
        .validate()
        .map_err(|errors| WardenError::Validation(errors.join("; ")))?;

    let _log_guard = init_logging(&config.logging, cli.command.service_name());

    let worker_names = config.fleet.instances.iter().map(|i| i.id.clone()).collect();
    let pm: Arc<dyn ProcessManager> =
        Arc::new(Pm2Adapter::new(&config.process_manager, worker_names));

    match &cli.command {
        Commands::Run => run_services(&config, pm, true, true).await,
        Commands::Watchdog => run_services(&config, pm, true, false).await,
        Commands::Sweeper => run_services(&config, pm, false, true).await,
        Commands::Sweep => {
            let report = RetentionSweeper::from_config(&config.retention).sweep_now().await;
            println!(
                "Deleted {} of {} files ({} bytes), {} failures, {} missing directories",
                report.deleted.len(),
                report.scanned,
                report.bytes_freed(),
                report.failed.len(),
                report.missing_dirs.len()
            );
        }
        Commands::Probe => {
            let watchdog = build_watchdog(&config, build_controller(&config, pm));
            for sample in watchdog.probe_all().await {
                match (&sample.queue_remaining, &sample.error) {
                    (_, Some(err)) => println!("  {:<20} error: {}", sample.instance_id, err),
                    (Some(depth), None) => {
                        let flag = if *depth > config.watchdog.queue_threshold {
                            "  STUCK"
                        } else {
                            ""
                        };
                        println!("  {:<20} queue_remaining={}{}", sample.instance_id, depth, flag)
                    }
                    (None, None) => println!("  {:<20} no data", sample.instance_id),
                }
            }
        }
        Commands::Restart { target } => {
            let controller = build_controller(&config, pm);
            let report = match Target::from(target.as_str()) {
                Target::All => controller.restart_all().await,
                Target::Named(id) => controller.restart_instance(&id).await?,
            };
            for outcome in &report.outcomes {
                println!(
                    "  {} {} attempt {}: {}",
                    outcome.target,
                    outcome.phase,
                    outcome.attempt,
                    if outcome.success { "ok" } else { "FAILED" }
                );
            }
            if !report.success() {
                return Err(anyhow!("restart of {} did not complete: {:?}", report.target, report.result));
            }
        }
        Commands::Bootstrap => {
            let executable = std::env::current_exe().context("locating own executable")?;
            let config_dir = std::fs::canonicalize(&cli.config_dir).unwrap_or_else(|_| cli.config_dir.clone());
            let services = bootstrap::service_registrations(&config, &executable, &config_dir);
            let instance_ids = config.fleet.instances.iter().map(|i| i.id.clone()).collect();

            let supervisor = SupervisorBootstrap::new(
                pm,
                services,
                instance_ids,
                BootstrapSettings::from(&config.bootstrap),
                config.process_manager.resolved_home(),
            );
            let summary = supervisor.run().await;

            println!("Cleanup: {:?}", summary.cleanup);
            for service in &summary.services {
                let state = if service.online { "online" } else { "OFFLINE" };
                println!("  {:<20} {:<8} pid {:?}", service.name, state, service.pid);
            }
            if !summary.saved {
                warn!("Process list not saved; services will not survive a reboot");
            }
        }
    }

    Ok(())
}

fn build_controller(config: &AppConfig, pm: Arc<dyn ProcessManager>) -> Arc<RestartController> {
    Arc::new(RestartController::new(
        pm,
        config.fleet.instances.clone(),
        RestartTiming::from_config(&config.restart, &config.watchdog),
    ))
}

fn build_watchdog(config: &AppConfig, controller: Arc<RestartController>) -> QueueWatchdog {
    let settings = WatchdogSettings::from(&config.watchdog);
    let prober = Arc::new(HttpProber::new(&config.fleet, settings.probe_timeout));
    QueueWatchdog::new(settings, prober, controller)
}

/// Spawn the requested loops and block until a termination signal
async fn run_services(
    config: &AppConfig,
    pm: Arc<dyn ProcessManager>,
    watchdog: bool,
    sweeper: bool,
) {
    let shutdown = Shutdown::new();
    let controller = build_controller(config, pm);
    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    if watchdog {
        let wd = build_watchdog(config, controller.clone());
        handles.push(tokio::spawn(wd.run(shutdown.token())));

        if config.schedule.enabled {
            let scheduler = RestartScheduler::new(
                config.schedule.full_restart_interval(),
                RetentionSweeper::from_config(&config.retention),
                controller.clone(),
            );
            handles.push(tokio::spawn(scheduler.run(shutdown.token())));
        }
    }

    if sweeper {
        let sw = RetentionSweeper::from_config(&config.retention);
        handles.push(tokio::spawn(sw.run(shutdown.token())));
    }

    shutdown_signal().await;
    info!("Termination signal received, exiting");
    shutdown.trigger();

    // No drain: in-flight restarts and sweeps are safe to abandon
    if tokio::time::timeout(Duration::from_secs(2), futures::future::join_all(handles))
        .await
        .is_err()
    {
        warn!("Some tasks did not stop in time");
    }
}
