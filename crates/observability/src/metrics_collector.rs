use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use orchestrator_domain::events::{EventPayload, OrchestratorEvent, ScalingEvent, TaskEvent, WorkerEvent};
use orchestrator_domain::models::{QueueTier, ScaleDirection, WorkerStatus};

/// 控制平面指标
///
/// 未安装全局 recorder 时所有记录都是空操作。
pub struct MetricsCollector {
    // Task metrics
    tasks_enqueued_total: Counter,
    tasks_assigned_total: Counter,
    tasks_completed_total: Counter,
    task_failures_total: Counter,
    task_retries_total: Counter,
    task_timeouts_total: Counter,
    task_retry_exhausted_total: Counter,
    task_execution_duration: Histogram,

    // Worker metrics
    pool_size: Gauge,
    worker_heartbeat_count: Counter,
    worker_offline_total: Counter,
    worker_restarts_total: Counter,
    worker_restart_limit_total: Counter,

    // Scaling metrics
    scaling_workers_added_total: Counter,
    scaling_workers_removed_total: Counter,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            tasks_enqueued_total: counter!("orchestrator_tasks_enqueued_total"),
            tasks_assigned_total: counter!("orchestrator_tasks_assigned_total"),
            tasks_completed_total: counter!("orchestrator_tasks_completed_total"),
            task_failures_total: counter!("orchestrator_task_failures_total"),
            task_retries_total: counter!("orchestrator_task_retries_total"),
            task_timeouts_total: counter!("orchestrator_task_timeouts_total"),
            task_retry_exhausted_total: counter!("orchestrator_task_retry_exhausted_total"),
            task_execution_duration: histogram!("orchestrator_task_execution_duration_seconds"),

            pool_size: gauge!("orchestrator_pool_size"),
            worker_heartbeat_count: counter!("orchestrator_worker_heartbeat_count_total"),
            worker_offline_total: counter!("orchestrator_worker_offline_total"),
            worker_restarts_total: counter!("orchestrator_worker_restarts_total"),
            worker_restart_limit_total: counter!("orchestrator_worker_restart_limit_total"),

            scaling_workers_added_total: counter!("orchestrator_scaling_workers_added_total"),
            scaling_workers_removed_total: counter!("orchestrator_scaling_workers_removed_total"),
        }
    }

    /// 根据事件更新计数器
    pub fn record_event(&self, event: &OrchestratorEvent) {
        match &event.payload {
            EventPayload::Task(task_event) => self.record_task_event(task_event),
            EventPayload::Worker(worker_event) => self.record_worker_event(worker_event),
            EventPayload::Scaling(scaling_event) => self.record_scaling_event(scaling_event),
        }
    }

    fn record_task_event(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Queued { .. } => self.tasks_enqueued_total.increment(1),
            TaskEvent::Assigned { .. } => self.tasks_assigned_total.increment(1),
            TaskEvent::Started { .. } => {}
            TaskEvent::Completed {
                execution_seconds, ..
            } => {
                self.tasks_completed_total.increment(1);
                if let Some(seconds) = execution_seconds {
                    self.task_execution_duration.record(*seconds);
                }
            }
            TaskEvent::Failed { will_retry, .. } => {
                self.task_failures_total.increment(1);
                if *will_retry {
                    self.task_retries_total.increment(1);
                }
            }
            TaskEvent::Escalated { .. } => {}
            TaskEvent::TimedOut { .. } => self.task_timeouts_total.increment(1),
            TaskEvent::RetryExhausted { .. } => self.task_retry_exhausted_total.increment(1),
        }
    }

    fn record_worker_event(&self, event: &WorkerEvent) {
        match event {
            WorkerEvent::Heartbeat { .. } => self.worker_heartbeat_count.increment(1),
            WorkerEvent::Offline { .. } => self.worker_offline_total.increment(1),
            WorkerEvent::Restarted { .. } => self.worker_restarts_total.increment(1),
            WorkerEvent::RestartLimitReached { .. } => self.worker_restart_limit_total.increment(1),
            WorkerEvent::Registered { .. } | WorkerEvent::Stopping { .. } | WorkerEvent::Removed { .. } => {}
        }
    }

    fn record_scaling_event(&self, event: &ScalingEvent) {
        match event {
            ScalingEvent::DecisionMade { decision } => {
                counter!(
                    "orchestrator_scaling_decisions_total",
                    "direction" => decision.direction.to_string()
                )
                .increment(1);
            }
            ScalingEvent::Applied {
                direction, applied, ..
            } => match direction {
                ScaleDirection::ScaleUp => self.scaling_workers_added_total.increment(*applied as u64),
                ScaleDirection::ScaleDown => {
                    self.scaling_workers_removed_total.increment(*applied as u64)
                }
                ScaleDirection::Maintain => {}
            },
        }
    }

    pub fn set_queue_depth(&self, tier: QueueTier, depth: usize) {
        gauge!("orchestrator_queue_depth", "tier" => tier.to_string()).set(depth as f64);
    }

    pub fn record_wait_time(&self, tier: QueueTier, seconds: f64) {
        histogram!("orchestrator_task_wait_seconds", "tier" => tier.to_string()).record(seconds);
    }

    pub fn set_pool_size(&self, size: usize) {
        self.pool_size.set(size as f64);
    }

    pub fn set_workers_by_status(&self, status: WorkerStatus, count: usize) {
        gauge!("orchestrator_workers", "status" => status.as_str()).set(count as f64);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
