mod common;

use axum::routing::get;
use axum::{Json, Router};
use common::{fleet, Call, FakeProcessManager};
use fleetwarden::config::FleetConfig;
use fleetwarden::domain::{Instance, RestartPhase};
use fleetwarden::supervisor::{
    HttpProber, QueueWatchdog, RestartController, RestartTiming, WatchdogSettings,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Stand-in for the reverse proxy in front of four workers:
/// 1 idle, 2 stuck at depth 12, 3 hangs, 4 returns garbage.
async fn spawn_status_server() -> SocketAddr {
    let app = Router::new()
        .route(
            "/comfy1/prompt",
            get(|| async { Json(json!({"exec_info": {"queue_remaining": 0}})) }),
        )
        .route(
            "/comfy2/prompt",
            get(|| async { Json(json!({"exec_info": {"queue_remaining": 12}})) }),
        )
        .route(
            "/comfy3/prompt",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Json(json!({"exec_info": {"queue_remaining": 99}}))
            }),
        )
        .route("/comfy4/prompt", get(|| async { "<html>502 Bad Gateway</html>" }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn settings() -> WatchdogSettings {
    WatchdogSettings {
        poll_interval: Duration::from_secs(30),
        queue_threshold: 5,
        probe_timeout: Duration::from_secs(1),
        log_every_n_ticks: 10,
    }
}

async fn watchdog_for(
    instances: Vec<Instance>,
    pm: Arc<FakeProcessManager>,
    timing: RestartTiming,
) -> (QueueWatchdog, Arc<RestartController>) {
    let addr = spawn_status_server().await;
    let fleet_config = FleetConfig {
        host: addr.to_string(),
        scheme: "http".to_string(),
        instances: instances.clone(),
    };
    let settings = settings();
    let prober = Arc::new(HttpProber::new(&fleet_config, settings.probe_timeout));
    let controller = Arc::new(RestartController::new(pm, instances, timing));
    (
        QueueWatchdog::new(settings, prober, controller.clone()),
        controller,
    )
}

#[tokio::test]
async fn stuck_instance_gets_exactly_one_stop_then_start() {
    let instances = fleet(4);
    let pm = Arc::new(FakeProcessManager::with_online(&instances));
    let (mut watchdog, controller) =
        watchdog_for(instances, pm.clone(), RestartTiming::immediate()).await;
    let mut outcomes = controller.subscribe();

    let report = watchdog.tick().await;

    assert_eq!(report.triggered(), vec!["2"]);
    assert_eq!(
        pm.lifecycle_calls(),
        vec![Call::Stop("2".into()), Call::Start("2".into())]
    );

    let mut phases = Vec::new();
    while let Ok(outcome) = outcomes.try_recv() {
        assert_eq!(outcome.target.as_str(), "2");
        phases.push(outcome.phase);
    }
    assert_eq!(
        phases,
        vec![RestartPhase::Stopping, RestartPhase::Verifying, RestartPhase::Starting]
    );
}

#[tokio::test]
async fn timed_out_and_malformed_probes_do_not_trigger_restarts() {
    let instances = fleet(4);
    let pm = Arc::new(FakeProcessManager::with_online(&instances));
    let (mut watchdog, _) = watchdog_for(instances, pm.clone(), RestartTiming::immediate()).await;

    let report = watchdog.tick().await;

    let sample = |id: &str| {
        report
            .samples
            .iter()
            .find(|s| s.instance_id == id)
            .cloned()
            .unwrap()
    };

    let hanging = sample("3");
    assert!(hanging.error.is_some());
    assert_eq!(hanging.queue_remaining, None);

    let garbage = sample("4");
    assert!(garbage.error.is_some());
    assert_eq!(garbage.queue_remaining, None);

    assert_eq!(sample("1").queue_remaining, Some(0));

    // Only the genuinely stuck instance is touched
    assert!(pm
        .lifecycle_calls()
        .iter()
        .all(|c| *c == Call::Stop("2".into()) || *c == Call::Start("2".into())));
}

#[tokio::test]
async fn cooldown_prevents_overlapping_restarts() {
    let instances = fleet(2);
    let pm = Arc::new(FakeProcessManager::with_online(&instances));
    let timing = RestartTiming {
        cooldown: Duration::from_secs(60),
        ..RestartTiming::immediate()
    };
    let (mut watchdog, _) = watchdog_for(instances, pm.clone(), timing).await;

    let first = watchdog.tick().await;
    let second = watchdog.tick().await;

    assert!(first.restarts[0].success());
    assert!(second.restarts[0].was_skipped());
    assert_eq!(
        pm.lifecycle_calls(),
        vec![Call::Stop("2".into()), Call::Start("2".into())]
    );
}

#[tokio::test]
async fn without_cooldown_consecutive_ticks_restart_again() {
    let instances = fleet(2);
    let pm = Arc::new(FakeProcessManager::with_online(&instances));
    let (mut watchdog, _) = watchdog_for(instances, pm.clone(), RestartTiming::immediate()).await;

    watchdog.tick().await;
    watchdog.tick().await;

    assert_eq!(pm.lifecycle_calls().len(), 4);
}
