use std::sync::Arc;

use chrono::{Duration, Utc};
use orchestrator_dispatcher::{
    strategy_for, EdfStrategy, FifoStrategy, PriorityStrategy, Scheduler, SchedulingStrategy,
};
use orchestrator_domain::models::{SchedulingStrategyKind, TaskPriority};
use orchestrator_domain::ports::Clock;
use orchestrator_domain::priority_policy::PriorityAdjustmentPolicy;
use orchestrator_testing_utils::{ManualClock, TaskBuilder};

fn scheduler_with(strategy: Box<dyn SchedulingStrategy>, clock: &ManualClock) -> Scheduler {
    Scheduler::new(
        strategy,
        PriorityAdjustmentPolicy::new(300),
        Arc::new(clock.clone()),
    )
}

#[test]
fn test_priority_returns_higher_priority_first() {
    let clock = ManualClock::default();
    let mut scheduler = scheduler_with(Box::new(PriorityStrategy), &clock);
    let now = clock.now();

    scheduler.add_task(TaskBuilder::new().with_id("low").low().created_at(now).build());
    scheduler.add_task(
        TaskBuilder::new()
            .with_id("normal")
            .created_at(now + Duration::seconds(1))
            .build(),
    );
    scheduler.add_task(
        TaskBuilder::new()
            .with_id("critical")
            .critical()
            .created_at(now + Duration::seconds(2))
            .build(),
    );
    scheduler.add_task(
        TaskBuilder::new()
            .with_id("high")
            .high()
            .created_at(now + Duration::seconds(3))
            .build(),
    );

    let order: Vec<String> = std::iter::from_fn(|| scheduler.get_next_task(None))
        .map(|t| t.id)
        .collect();
    assert_eq!(order, vec!["critical", "high", "normal", "low"]);
}

#[test]
fn test_fifo_returns_earliest_created_regardless_of_priority() {
    let clock = ManualClock::default();
    let mut scheduler = scheduler_with(Box::new(FifoStrategy), &clock);
    let now = clock.now();

    scheduler.add_task(
        TaskBuilder::new()
            .with_id("critical-late")
            .critical()
            .created_at(now + Duration::seconds(5))
            .build(),
    );
    scheduler.add_task(
        TaskBuilder::new()
            .with_id("low-early")
            .low()
            .created_at(now)
            .build(),
    );

    assert_eq!(scheduler.get_next_task(None).unwrap().id, "low-early");
    assert_eq!(scheduler.get_next_task(None).unwrap().id, "critical-late");
    assert!(scheduler.get_next_task(None).is_none());
}

#[test]
fn test_edf_prefers_earliest_deadline() {
    let clock = ManualClock::default();
    let mut scheduler = scheduler_with(Box::new(EdfStrategy), &clock);
    let now = clock.now();

    scheduler.add_task(
        TaskBuilder::new()
            .with_id("A")
            .created_at(now)
            .with_deadline(now + Duration::minutes(10))
            .build(),
    );
    scheduler.add_task(
        TaskBuilder::new()
            .with_id("B")
            .created_at(now)
            .with_deadline(now + Duration::minutes(5))
            .build(),
    );

    assert_eq!(scheduler.get_next_task(None).unwrap().id, "B");
}

#[test]
fn test_edf_serves_deadlined_tasks_before_others() {
    let clock = ManualClock::default();
    let mut scheduler = scheduler_with(Box::new(EdfStrategy), &clock);
    let now = clock.now();

    scheduler.add_task(
        TaskBuilder::new()
            .with_id("no-deadline")
            .critical()
            .created_at(now - Duration::seconds(30))
            .build(),
    );
    scheduler.add_task(
        TaskBuilder::new()
            .with_id("far")
            .low()
            .created_at(now)
            .with_deadline(now + Duration::hours(4))
            .build(),
    );

    assert_eq!(scheduler.get_next_task(None).unwrap().id, "far");
    assert_eq!(scheduler.get_next_task(None).unwrap().id, "no-deadline");
}

#[test]
fn test_starved_task_is_boosted_before_selection() {
    let clock = ManualClock::default();
    let mut scheduler = Scheduler::new(
        Box::new(PriorityStrategy),
        PriorityAdjustmentPolicy::new(60),
        Arc::new(clock.clone()),
    );

    scheduler.add_task(
        TaskBuilder::new()
            .with_id("old-low")
            .low()
            .created_at(clock.now())
            .build(),
    );
    clock.advance_secs(61);
    scheduler.add_task(
        TaskBuilder::new()
            .with_id("fresh-normal")
            .created_at(clock.now())
            .build(),
    );

    // LOW 提升为 NORMAL 后与新任务同级，创建时间更早者胜出
    let next = scheduler.get_next_task(None).unwrap();
    assert_eq!(next.id, "old-low");
    assert_eq!(next.priority, TaskPriority::Normal);
    assert_eq!(scheduler.get_metrics().priority_boosts, 1);
}

#[test]
fn test_long_starvation_boosts_multiple_levels() {
    let clock = ManualClock::default();
    let mut scheduler = Scheduler::new(
        Box::new(PriorityStrategy),
        PriorityAdjustmentPolicy::new(60),
        Arc::new(clock.clone()),
    );
    scheduler.add_task(
        TaskBuilder::new()
            .with_id("ancient")
            .low()
            .created_at(clock.now())
            .build(),
    );
    clock.advance_secs(200);
    scheduler.add_task(
        TaskBuilder::new()
            .with_id("fresh-high")
            .high()
            .created_at(clock.now())
            .build(),
    );

    let next = scheduler.get_next_task(None).unwrap();
    assert_eq!(next.id, "ancient");
    assert_eq!(next.priority, TaskPriority::Critical);
}

#[test]
fn test_aging_is_recomputed_not_accumulated() {
    let clock = ManualClock::default();
    let mut scheduler = Scheduler::new(
        Box::new(FifoStrategy),
        PriorityAdjustmentPolicy::new(60),
        Arc::new(clock.clone()),
    );
    scheduler.add_task(
        TaskBuilder::new()
            .with_id("waiting")
            .low()
            .created_at(clock.now())
            .build(),
    );
    scheduler.add_task(
        TaskBuilder::new()
            .with_id("other")
            .low()
            .created_at(clock.now() + Duration::seconds(1))
            .build(),
    );
    clock.advance_secs(90);

    // 多次调度只提升一级
    scheduler.get_next_task(None);
    let remaining = scheduler.get_pending_tasks();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].priority, TaskPriority::Normal);
    assert!(scheduler.get_next_task(None).is_some());
    assert_eq!(scheduler.get_metrics().priority_boosts, 2);
}

#[test]
fn test_duplicate_add_is_ignored_and_remove_reports_presence() {
    let clock = ManualClock::default();
    let mut scheduler = scheduler_with(Box::new(PriorityStrategy), &clock);
    let task = TaskBuilder::new().with_id("dup").build();

    assert!(scheduler.add_task(task.clone()));
    assert!(!scheduler.add_task(task));
    assert_eq!(scheduler.pending_count(), 1);

    assert!(scheduler.remove_task("dup"));
    assert!(!scheduler.remove_task("dup"));
    assert!(!scheduler.remove_task("missing"));
    assert!(scheduler.get_next_task(None).is_none());
}

#[test]
fn test_queue_depths_and_metrics() {
    let clock = ManualClock::default();
    let mut scheduler = scheduler_with(strategy_for(SchedulingStrategyKind::Priority, 0.8, 0.5), &clock);

    scheduler.add_task(TaskBuilder::new().high().created_at(clock.now()).build());
    scheduler.add_task(TaskBuilder::new().high().created_at(clock.now()).build());
    scheduler.add_task(TaskBuilder::new().low().created_at(clock.now()).build());

    let depths = scheduler.get_queue_depths();
    assert_eq!(depths[&TaskPriority::High], 2);
    assert_eq!(depths[&TaskPriority::Low], 1);
    assert_eq!(depths[&TaskPriority::Critical], 0);
    assert_eq!(depths.len(), 4);

    let next = scheduler.get_next_task(None).unwrap();
    scheduler.mark_completed(&next.id, true);

    let metrics = scheduler.get_metrics();
    assert_eq!(metrics.strategy, "PRIORITY");
    assert_eq!(metrics.total_submitted, 3);
    assert_eq!(metrics.total_scheduled, 1);
    assert_eq!(metrics.total_completed, 1);
    assert_eq!(metrics.deadline_misses, 1);
    assert_eq!(metrics.pending, 2);

    scheduler.clear();
    assert_eq!(scheduler.pending_count(), 0);
    assert_eq!(scheduler.get_metrics().total_submitted, 3);
}

#[test]
fn test_adaptive_uses_pool_utilization() {
    let clock = ManualClock::new(Utc::now());
    let mut scheduler = scheduler_with(strategy_for(SchedulingStrategyKind::Adaptive, 0.8, 0.5), &clock);
    let now = clock.now();

    scheduler.add_task(TaskBuilder::new().with_id("early-low").low().created_at(now).build());
    scheduler.add_task(
        TaskBuilder::new()
            .with_id("late-critical")
            .critical()
            .created_at(now + Duration::seconds(1))
            .build(),
    );

    // 中等负载退化为 FIFO
    assert_eq!(scheduler.get_next_task(Some(0.6)).unwrap().id, "early-low");
    scheduler.add_task(TaskBuilder::new().with_id("early-low-2").low().created_at(now).build());
    // 过载时 CRITICAL 优先
    assert_eq!(scheduler.get_next_task(Some(0.95)).unwrap().id, "late-critical");
}
