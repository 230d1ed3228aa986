use std::collections::HashMap;
use std::sync::Arc;

use orchestrator_domain::models::{ScaleDirection, Trend, WorkerStatus};
use orchestrator_pool::{
    Autoscaler, AutoscalerSettings, HealthMonitor, PoolManagerConfig, ScalingController,
    WorkerPoolManager,
};
use orchestrator_testing_utils::{
    scenario_policy, ManualClock, ManualTicker, MockFailureHandler, MockMetricsSource,
    MockProvisioner, PoolMetricsBuilder, RecordingEventSink,
};
use tokio::sync::broadcast;

struct Fixture {
    pool: Arc<WorkerPoolManager>,
    clock: ManualClock,
    provisioner: MockProvisioner,
    events: Arc<RecordingEventSink>,
}

fn fixture() -> Fixture {
    let clock = ManualClock::default();
    let provisioner = MockProvisioner::new();
    let events = Arc::new(RecordingEventSink::new());
    let pool = Arc::new(WorkerPoolManager::new(
        PoolManagerConfig {
            min_workers: 2,
            max_workers: 10,
            ..PoolManagerConfig::default()
        },
        Arc::new(provisioner.clone()),
        Arc::new(clock.clone()),
        events.clone(),
    ));
    Fixture {
        pool,
        clock,
        provisioner,
        events,
    }
}

async fn register_n(f: &Fixture, n: usize) {
    for i in 1..=n {
        f.pool
            .register_worker(&format!("w-{i}"), "default", HashMap::new())
            .await
            .unwrap();
    }
}

fn autoscaler(f: &Fixture) -> Arc<Autoscaler> {
    Arc::new(Autoscaler::new(
        scenario_policy(),
        AutoscalerSettings::default(),
        Arc::new(f.clock.clone()),
        f.events.clone(),
    ))
}

#[tokio::test]
async fn test_health_monitor_requeues_tasks_of_offline_workers() {
    let f = fixture();
    register_n(&f, 2).await;
    let handler = MockFailureHandler::with_requeued_count(3);
    let monitor = HealthMonitor::new(f.pool.clone(), Arc::new(handler.clone()), false);

    assert_eq!(monitor.check_once().await.offline, Vec::<String>::new());

    f.clock.advance_secs(31);
    let mut report = monitor.check_once().await;
    report.offline.sort();
    assert_eq!(report.offline, vec!["w-1".to_string(), "w-2".to_string()]);
    assert_eq!(report.requeued_tasks, 6);
    assert!(report.restarted.is_empty());

    let mut reported = handler.failed_workers();
    reported.sort();
    assert_eq!(reported, vec!["w-1".to_string(), "w-2".to_string()]);

    assert!(monitor.check_once().await.offline.is_empty());
    assert_eq!(handler.failed_workers().len(), 2);
}

#[tokio::test]
async fn test_health_monitor_can_restart_offline_workers() {
    let f = fixture();
    register_n(&f, 1).await;
    let monitor = HealthMonitor::new(f.pool.clone(), Arc::new(MockFailureHandler::new()), true);

    f.clock.advance_secs(31);
    let report = monitor.check_once().await;
    assert_eq!(report.restarted, vec!["w-1".to_string()]);
    let worker = f.pool.get_worker("w-1").await.unwrap();
    assert_eq!(worker.status, WorkerStatus::Starting);
    assert_eq!(worker.restart_count, 1);
}

#[tokio::test]
async fn test_health_monitor_loop_runs_until_shutdown() {
    let f = fixture();
    register_n(&f, 1).await;
    let handler = MockFailureHandler::new();
    let monitor = HealthMonitor::new(f.pool.clone(), Arc::new(handler.clone()), false);

    let (ticker, mut handle) = ManualTicker::channel();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(monitor.run(Box::new(ticker), shutdown_rx));

    f.clock.advance_secs(31);
    assert!(handle.advance().await);
    assert_eq!(handler.failed_workers(), vec!["w-1".to_string()]);

    shutdown_tx.send(()).unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_controller_applies_autoscaler_decision() {
    let f = fixture();
    register_n(&f, 5).await;
    let metrics = MockMetricsSource::with_metrics(
        PoolMetricsBuilder::new()
            .with_pool_size(5)
            .with_utilization(90.0)
            .build(),
    );
    let autoscaler = autoscaler(&f);
    let controller = ScalingController::new(
        f.pool.clone(),
        Some(autoscaler.clone()),
        Arc::new(metrics.clone()),
        "default",
    );

    let outcome = controller.evaluate_once().await;
    let decision = outcome.decision.unwrap();
    assert_eq!(decision.direction, ScaleDirection::ScaleUp);
    assert_eq!(decision.target_size, 7);
    assert_eq!(outcome.requested, 2);
    assert_eq!(f.provisioner.spawned_ids().len(), 2);
    assert_eq!(f.pool.pool_size().await, 7);

    // 冷却期内不再扩容
    let outcome = controller.evaluate_once().await;
    assert!(outcome.decision.unwrap().is_maintain());
    assert_eq!(outcome.requested, 0);
    assert_eq!(metrics.sample_count(), 2);
}

#[tokio::test]
async fn test_controller_scales_down_idle_workers() {
    let f = fixture();
    register_n(&f, 5).await;
    let metrics = MockMetricsSource::with_metrics(
        PoolMetricsBuilder::new().with_utilization(40.0).build(),
    );
    let controller = ScalingController::new(
        f.pool.clone(),
        Some(autoscaler(&f)),
        Arc::new(metrics),
        "default",
    );

    let outcome = controller.evaluate_once().await;
    assert_eq!(outcome.requested, 1);
    assert_eq!(f.pool.pool_size().await, 4);
    assert_eq!(f.provisioner.terminated_ids().len(), 1);
}

#[tokio::test]
async fn test_controller_holds_when_metrics_missing() {
    let f = fixture();
    register_n(&f, 3).await;
    let autoscaler = autoscaler(&f);
    let controller = ScalingController::new(
        f.pool.clone(),
        Some(autoscaler.clone()),
        Arc::new(MockMetricsSource::new()),
        "default",
    );

    let outcome = controller.evaluate_once().await;
    assert!(outcome.decision.unwrap().is_maintain());
    assert_eq!(outcome.requested, 0);
    assert_eq!(autoscaler.get_scaling_history(10).await.len(), 1);
}

#[tokio::test]
async fn test_controller_without_autoscaler_uses_queue_depth() {
    let f = fixture();
    register_n(&f, 2).await;
    let metrics = MockMetricsSource::with_metrics(
        PoolMetricsBuilder::new()
            .with_queue_depth(30, Trend::Stable)
            .build(),
    );
    let controller = ScalingController::new(f.pool.clone(), None, Arc::new(metrics), "default");

    let outcome = controller.evaluate_once().await;
    assert!(outcome.decision.is_none());
    assert_eq!(outcome.action.direction, ScaleDirection::ScaleUp);
    assert_eq!(outcome.requested, 4);
    assert_eq!(f.pool.pool_size().await, 6);
}

#[tokio::test]
async fn test_controller_loop_stops_when_ticker_closes() {
    let f = fixture();
    let controller = ScalingController::new(
        f.pool.clone(),
        None,
        Arc::new(MockMetricsSource::new()),
        "default",
    );
    let (ticker, mut handle) = ManualTicker::channel();
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(controller.run(Box::new(ticker), shutdown_rx));

    assert!(handle.advance().await);
    handle.close();
    task.await.unwrap();
}
