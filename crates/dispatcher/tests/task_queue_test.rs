use std::sync::Arc;

use orchestrator_dispatcher::{TaskQueueConfig, TaskQueueManager, TimedOutTask};
use orchestrator_domain::models::{QueueTier, QueuedTaskStatus};
use orchestrator_domain::ports::WorkerFailureHandler;
use orchestrator_domain::priority_policy::PriorityAdjustmentPolicy;
use orchestrator_errors::OrchestratorError;
use orchestrator_testing_utils::{ManualClock, RecordingEventSink, TaskBuilder};

struct Fixture {
    queue: TaskQueueManager,
    clock: ManualClock,
    events: Arc<RecordingEventSink>,
}

fn fixture() -> Fixture {
    let clock = ManualClock::default();
    let events = Arc::new(RecordingEventSink::new());
    let queue = TaskQueueManager::new(
        TaskQueueConfig::default(),
        PriorityAdjustmentPolicy::default(),
        Arc::new(clock.clone()),
        events.clone(),
    );
    Fixture {
        queue,
        clock,
        events,
    }
}

/// 把任务推进到 IN_PROGRESS
async fn start(f: &Fixture, worker: &str) -> String {
    let task = f.queue.dequeue(worker).await.unwrap().expect("队列中应有任务");
    assert!(f.queue.mark_in_progress(task.id()).await.unwrap());
    task.id().to_string()
}

#[tokio::test]
async fn test_enqueue_then_dequeue_returns_same_task() {
    let f = fixture();
    let task = TaskBuilder::new().with_name("render").build();
    let id = f.queue.enqueue(task.clone(), QueueTier::Normal, 60, 3).await;
    assert_eq!(id, task.id);

    let dequeued = f.queue.dequeue("worker-1").await.unwrap().unwrap();
    assert_eq!(dequeued.task, task);
    assert_eq!(dequeued.status, QueuedTaskStatus::Assigned);
    assert_eq!(dequeued.assigned_worker.as_deref(), Some("worker-1"));
    assert_eq!(f.queue.get_worker_load("worker-1").await, 1);
    assert!(f.queue.dequeue("worker-1").await.unwrap().is_none());
    assert_eq!(f.events.event_types(), vec!["task.queued", "task.assigned"]);
}

#[tokio::test]
async fn test_dequeue_scans_tiers_high_to_low_and_fifo_within_tier() {
    let f = fixture();
    f.queue
        .enqueue_with_defaults(TaskBuilder::new().with_id("low-1").build(), QueueTier::Low)
        .await;
    f.queue
        .enqueue_with_defaults(TaskBuilder::new().with_id("normal-1").build(), QueueTier::Normal)
        .await;
    f.queue
        .enqueue_with_defaults(TaskBuilder::new().with_id("high-1").build(), QueueTier::High)
        .await;
    f.queue
        .enqueue_with_defaults(TaskBuilder::new().with_id("high-2").build(), QueueTier::High)
        .await;

    let mut order = Vec::new();
    while let Some(task) = f.queue.dequeue("worker-1").await.unwrap() {
        order.push(task.id().to_string());
    }
    assert_eq!(order, vec!["high-1", "high-2", "normal-1", "low-1"]);
}

#[tokio::test]
async fn test_duplicate_enqueue_is_noop() {
    let f = fixture();
    let task = TaskBuilder::new().with_id("dup").build();
    f.queue.enqueue(task.clone(), QueueTier::Low, 60, 3).await;
    let id = f.queue.enqueue(task, QueueTier::High, 60, 3).await;

    assert_eq!(id, "dup");
    assert_eq!(f.queue.queue_depth().await, 1);
    assert_eq!(f.queue.get_task("dup").await.unwrap().tier, QueueTier::Low);
    assert_eq!(f.events.count_of("task.queued"), 1);
}

#[tokio::test]
async fn test_full_lifecycle_records_latency() {
    let f = fixture();
    f.queue
        .enqueue_with_defaults(TaskBuilder::new().with_id("job").build(), QueueTier::Normal)
        .await;
    f.clock.advance_secs(2);
    let id = start(&f, "worker-1").await;
    f.clock.advance_secs(3);

    assert!(f
        .queue
        .mark_completed(&id, Some(serde_json::json!({"rows": 42})))
        .await
        .unwrap());

    let task = f.queue.get_task(&id).await.unwrap();
    assert_eq!(task.status, QueuedTaskStatus::Completed);
    assert_eq!(task.result, Some(serde_json::json!({"rows": 42})));
    assert_eq!(f.queue.get_worker_load("worker-1").await, 0);
    assert_eq!(
        f.queue.get_task("slow").await.unwrap().last_error.as_deref(),
        Some("任务执行超时: slow (超时 30 秒)")
    );

    let metrics = f.queue.get_metrics().await;
    assert_eq!(metrics.total_completed, 1);
    assert_eq!(metrics.avg_wait_seconds, 2.0);
    assert_eq!(metrics.avg_execution_seconds, 3.0);
    assert_eq!(metrics.latency.p50_ms, 3000.0);
    assert_eq!(metrics.latency.samples, 1);
    assert_eq!(
        f.events.event_types(),
        vec!["task.queued", "task.assigned", "task.started", "task.completed"]
    );
}

#[tokio::test]
async fn test_retry_requeues_once_at_tail_of_escalated_tier() {
    let f = fixture();
    f.queue
        .enqueue(TaskBuilder::new().with_id("flaky").build(), QueueTier::Low, 60, 3)
        .await;
    let id = start(&f, "worker-1").await;
    f.queue
        .enqueue(TaskBuilder::new().with_id("waiting").build(), QueueTier::Normal, 60, 3)
        .await;

    assert!(f.queue.mark_failed(&id, "boom", true).await.unwrap());

    let task = f.queue.get_task(&id).await.unwrap();
    assert_eq!(task.status, QueuedTaskStatus::Queued);
    assert_eq!(task.retry_count, 1);
    assert_eq!(task.tier, QueueTier::Normal);
    assert_eq!(task.last_error.as_deref(), Some("boom"));
    assert!(task.assigned_worker.is_none());
    assert_eq!(f.queue.queue_depth().await, 2);
    assert_eq!(f.queue.get_worker_load("worker-1").await, 0);
    assert_eq!(
        f.queue.get_task("slow").await.unwrap().last_error.as_deref(),
        Some("任务执行超时: slow (超时 30 秒)")
    );

    let next = f.queue.dequeue("worker-2").await.unwrap().unwrap();
    assert_eq!(next.id(), "waiting");
    let retried = f.queue.dequeue("worker-2").await.unwrap().unwrap();
    assert_eq!(retried.id(), "flaky");
    assert!(f.queue.dequeue("worker-2").await.unwrap().is_none());

    assert_eq!(f.events.count_of("task.failed"), 1);
    assert_eq!(f.events.count_of("task.escalated"), 1);
    assert_eq!(f.queue.get_metrics().await.total_retried, 1);
}

#[tokio::test]
async fn test_high_tier_retry_stays_high() {
    let f = fixture();
    f.queue
        .enqueue(TaskBuilder::new().with_id("urgent").build(), QueueTier::High, 60, 3)
        .await;
    let id = start(&f, "worker-1").await;
    f.queue.mark_failed(&id, "boom", true).await.unwrap();

    assert_eq!(f.queue.get_task(&id).await.unwrap().tier, QueueTier::High);
    assert_eq!(f.events.count_of("task.escalated"), 0);
}

#[tokio::test]
async fn test_retry_exhaustion_is_terminal() {
    let f = fixture();
    f.queue
        .enqueue(TaskBuilder::new().with_id("doomed").build(), QueueTier::Low, 60, 2)
        .await;

    for _ in 0..2 {
        let id = start(&f, "worker-1").await;
        f.queue.mark_failed(&id, "boom", true).await.unwrap();
    }
    let id = start(&f, "worker-1").await;
    f.queue.mark_failed(&id, "boom", true).await.unwrap();

    let task = f.queue.get_task("doomed").await.unwrap();
    assert_eq!(task.status, QueuedTaskStatus::Failed);
    assert_eq!(task.retry_count, 2);
    assert!(task.completed_at.is_some());
    assert_eq!(f.queue.queue_depth().await, 0);
    assert_eq!(f.events.count_of("task.retry_exhausted"), 1);

    let err = f.queue.mark_failed("doomed", "again", true).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
    assert_eq!(f.queue.queue_depth().await, 0);
}

#[tokio::test]
async fn test_failure_without_retry_is_terminal() {
    let f = fixture();
    f.queue
        .enqueue_with_defaults(TaskBuilder::new().with_id("bad-input").build(), QueueTier::Normal)
        .await;
    let id = start(&f, "worker-1").await;

    f.queue.mark_failed(&id, "invalid input", false).await.unwrap();

    assert_eq!(
        f.queue.get_task_status(&id).await,
        Some(QueuedTaskStatus::Failed)
    );
    assert_eq!(f.events.count_of("task.retry_exhausted"), 0);
    assert_eq!(f.queue.get_metrics().await.total_failed, 1);
}

#[tokio::test]
async fn test_illegal_transitions_are_rejected() {
    let f = fixture();
    f.queue
        .enqueue_with_defaults(TaskBuilder::new().with_id("t").build(), QueueTier::Normal)
        .await;

    let err = f.queue.mark_completed("t", None).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
    let err = f.queue.mark_in_progress("t").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
    assert_eq!(
        f.queue.get_task_status("t").await,
        Some(QueuedTaskStatus::Queued)
    );

    let id = start(&f, "worker-1").await;
    f.queue.mark_completed(&id, None).await.unwrap();
    let err = f.queue.mark_in_progress(&id).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_unknown_ids_report_false() {
    let f = fixture();
    assert!(!f.queue.mark_in_progress("ghost").await.unwrap());
    assert!(!f.queue.mark_completed("ghost", None).await.unwrap());
    assert!(!f.queue.mark_failed("ghost", "x", true).await.unwrap());
    assert!(f.queue.get_task_status("ghost").await.is_none());
    assert!(f.events.events().is_empty());
}

#[tokio::test]
async fn test_check_timeouts_requeues_overdue_tasks() {
    let f = fixture();
    f.queue
        .enqueue(TaskBuilder::new().with_id("slow").build(), QueueTier::Normal, 30, 3)
        .await;
    f.queue
        .enqueue(TaskBuilder::new().with_id("fast").build(), QueueTier::Normal, 300, 3)
        .await;
    start(&f, "worker-1").await;
    start(&f, "worker-2").await;

    f.clock.advance_secs(30);
    assert!(f.queue.check_timeouts().await.unwrap().is_empty());

    f.clock.advance_secs(1);
    let timed_out = f.queue.check_timeouts().await.unwrap();
    assert_eq!(
        timed_out,
        vec![TimedOutTask {
            task_id: "slow".to_string(),
            worker_id: Some("worker-1".to_string()),
        }]
    );
    assert_eq!(f.queue.get_worker_load("worker-1").await, 0);
    assert_eq!(
        f.queue.get_task("slow").await.unwrap().last_error.as_deref(),
        Some("任务执行超时: slow (超时 30 秒)")
    );

    let task = f.queue.get_task("slow").await.unwrap();
    assert_eq!(task.status, QueuedTaskStatus::Queued);
    assert_eq!(task.retry_count, 1);
    assert_eq!(task.tier, QueueTier::High);
    assert_eq!(
        f.queue.get_task_status("fast").await,
        Some(QueuedTaskStatus::InProgress)
    );
    assert_eq!(f.events.count_of("task.timed_out"), 1);
    assert_eq!(f.queue.get_metrics().await.total_timeouts, 1);
}

#[tokio::test]
async fn test_unbounded_timeout_never_fires() {
    let f = fixture();
    f.queue
        .enqueue(TaskBuilder::new().with_id("t").build(), QueueTier::Normal, u64::MAX, 3)
        .await;
    start(&f, "worker-1").await;

    f.clock.advance_secs(1);
    assert!(f.queue.check_timeouts().await.unwrap().is_empty());
    f.clock.advance_secs(30 * 24 * 3600);
    assert!(f.queue.check_timeouts().await.unwrap().is_empty());
    assert_eq!(
        f.queue.get_task_status("t").await,
        Some(QueuedTaskStatus::InProgress)
    );
}

#[tokio::test]
async fn test_worker_failure_requeues_assigned_tasks() {
    let f = fixture();
    for id in ["a", "b", "c"] {
        f.queue
            .enqueue_with_defaults(TaskBuilder::new().with_id(id).build(), QueueTier::Normal)
            .await;
    }
    start(&f, "worker-1").await;
    f.queue.dequeue("worker-1").await.unwrap();
    f.queue.dequeue("worker-2").await.unwrap();

    let requeued = f.queue.handle_worker_failure("worker-1").await.unwrap();
    assert_eq!(requeued, 2);
    assert_eq!(f.queue.get_worker_load("worker-1").await, 0);
    assert_eq!(
        f.queue.get_task("slow").await.unwrap().last_error.as_deref(),
        Some("任务执行超时: slow (超时 30 秒)")
    );
    assert_eq!(f.queue.get_worker_load("worker-2").await, 1);
    assert_eq!(f.queue.queue_depth().await, 2);
    assert_eq!(f.queue.get_task("a").await.unwrap().retry_count, 1);

    assert_eq!(f.queue.handle_worker_failure("worker-1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_cleanup_removes_only_old_terminal_tasks() {
    let f = fixture();
    for id in ["done", "pending"] {
        f.queue
            .enqueue_with_defaults(TaskBuilder::new().with_id(id).build(), QueueTier::Normal)
            .await;
    }
    let id = start(&f, "worker-1").await;
    assert_eq!(id, "done");
    f.queue.mark_completed(&id, None).await.unwrap();

    assert_eq!(f.queue.cleanup_old_tasks(24).await, 0);
    f.clock.advance_secs(25 * 3600);
    assert_eq!(f.queue.cleanup_old_tasks(24).await, 1);

    assert!(f.queue.get_task("done").await.is_none());
    assert!(f.queue.get_task("pending").await.is_some());
    assert_eq!(f.queue.cleanup_old_tasks(u64::MAX).await, 0);
}

#[tokio::test]
async fn test_metrics_report_depth_by_tier() {
    let f = fixture();
    f.queue
        .enqueue_with_defaults(TaskBuilder::new().build(), QueueTier::High)
        .await;
    f.queue
        .enqueue_with_defaults(TaskBuilder::new().build(), QueueTier::Low)
        .await;
    f.queue
        .enqueue_with_defaults(TaskBuilder::new().build(), QueueTier::Low)
        .await;
    f.queue.dequeue("worker-1").await.unwrap();

    let metrics = f.queue.get_metrics().await;
    assert_eq!(metrics.depth_by_tier[&QueueTier::High], 0);
    assert_eq!(metrics.depth_by_tier[&QueueTier::Normal], 0);
    assert_eq!(metrics.depth_by_tier[&QueueTier::Low], 2);
    assert_eq!(metrics.queued, 2);
    assert_eq!(metrics.assigned, 1);
    assert_eq!(metrics.total_enqueued, 3);
    assert_eq!(metrics.worker_loads.get("worker-1"), Some(&1));
}
