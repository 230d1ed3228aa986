use orchestrator_domain::events::{
    DomainEvent, EventPayload, OrchestratorEvent, ScalingEvent, TaskEvent, WorkerEvent,
};
use orchestrator_domain::models::{ScaleDirection, ScalingDecision};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_location: bool,
    pub include_thread_id: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            include_location: true,
            include_thread_id: false,
        }
    }
}

/// 每个领域事件对应一条结构化日志
pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_event(event: &OrchestratorEvent) {
        match &event.payload {
            EventPayload::Task(task_event) => Self::log_task_event(task_event),
            EventPayload::Worker(worker_event) => Self::log_worker_event(worker_event),
            EventPayload::Scaling(scaling_event) => Self::log_scaling_event(scaling_event),
        }
        debug!(
            event.id = %event.event_id(),
            event.type = event.event_type(),
            event.occurred_at = %event.occurred_at,
            "Event published"
        );
    }

    fn log_task_event(event: &TaskEvent) {
        match event {
            TaskEvent::Queued {
                task_id,
                tier,
                retry_count,
            } => {
                info!(
                    event = "task_queued",
                    task.id = task_id.as_str(),
                    task.tier = %tier,
                    task.retry_count = retry_count,
                    "Task queued"
                );
            }
            TaskEvent::Assigned {
                task_id,
                worker_id,
                tier,
            } => {
                info!(
                    event = "task_assigned",
                    task.id = task_id.as_str(),
                    task.tier = %tier,
                    worker.id = worker_id.as_str(),
                    "Task assigned to worker"
                );
            }
            TaskEvent::Started { task_id, worker_id } => {
                info!(
                    event = "task_started",
                    task.id = task_id.as_str(),
                    worker.id = worker_id.as_deref().unwrap_or("unknown"),
                    "Task execution started"
                );
            }
            TaskEvent::Completed {
                task_id,
                worker_id,
                execution_seconds,
            } => {
                info!(
                    event = "task_completed",
                    task.id = task_id.as_str(),
                    worker.id = worker_id.as_deref().unwrap_or("unknown"),
                    task.execution_seconds = execution_seconds.unwrap_or_default(),
                    "Task execution completed successfully"
                );
            }
            TaskEvent::Failed {
                task_id,
                error,
                retry_count,
                will_retry,
            } => {
                warn!(
                    event = "task_failed",
                    task.id = task_id.as_str(),
                    task.error = error.as_str(),
                    task.retry_count = retry_count,
                    task.will_retry = will_retry,
                    "Task execution failed"
                );
            }
            TaskEvent::Escalated {
                task_id,
                from,
                to,
                retry_count,
            } => {
                warn!(
                    event = "task_retry",
                    task.id = task_id.as_str(),
                    task.from_tier = %from,
                    task.to_tier = %to,
                    task.retry_count = retry_count,
                    "Task requeued with escalated tier"
                );
            }
            TaskEvent::TimedOut {
                task_id,
                worker_id,
                timeout_seconds,
            } => {
                warn!(
                    event = "task_timeout",
                    task.id = task_id.as_str(),
                    worker.id = worker_id.as_deref().unwrap_or("unknown"),
                    task.timeout_seconds = timeout_seconds,
                    "Task exceeded its timeout"
                );
            }
            TaskEvent::RetryExhausted {
                task_id,
                max_retries,
                error,
            } => {
                error!(
                    event = "task_retry_exhausted",
                    task.id = task_id.as_str(),
                    task.max_retries = max_retries,
                    task.error = error.as_str(),
                    "Task failed permanently after exhausting retries"
                );
            }
        }
    }

    fn log_worker_event(event: &WorkerEvent) {
        match event {
            WorkerEvent::Registered {
                worker_id,
                worker_type,
            } => {
                info!(
                    event = "worker_registered",
                    worker.id = worker_id.as_str(),
                    worker.type = worker_type.as_str(),
                    "Worker registered"
                );
            }
            WorkerEvent::Heartbeat { worker_id, status } => {
                debug!(
                    event = "worker_heartbeat",
                    worker.id = worker_id.as_str(),
                    worker.status = %status,
                    "Worker heartbeat received"
                );
            }
            WorkerEvent::Offline {
                worker_id,
                heartbeat_age_seconds,
            } => {
                warn!(
                    event = "worker_offline",
                    worker.id = worker_id.as_str(),
                    worker.heartbeat_age_seconds = heartbeat_age_seconds,
                    "Worker marked offline"
                );
            }
            WorkerEvent::Restarted {
                worker_id,
                restart_count,
            } => {
                info!(
                    event = "worker_restarted",
                    worker.id = worker_id.as_str(),
                    worker.restart_count = restart_count,
                    "Worker restarted"
                );
            }
            WorkerEvent::RestartLimitReached {
                worker_id,
                max_restarts,
            } => {
                error!(
                    event = "worker_restart_limit_reached",
                    worker.id = worker_id.as_str(),
                    worker.max_restarts = max_restarts,
                    "Worker reached its restart limit, operator action required"
                );
            }
            WorkerEvent::Stopping { worker_id } => {
                info!(
                    event = "worker_stopping",
                    worker.id = worker_id.as_str(),
                    "Worker stopping"
                );
            }
            WorkerEvent::Removed { worker_id } => {
                info!(
                    event = "worker_removed",
                    worker.id = worker_id.as_str(),
                    "Worker removed from pool"
                );
            }
        }
    }

    fn log_scaling_event(event: &ScalingEvent) {
        match event {
            ScalingEvent::DecisionMade { decision } => Self::log_scaling_decision(decision),
            ScalingEvent::Applied {
                direction,
                requested,
                applied,
                worker_type,
            } => {
                info!(
                    event = "scaling_applied",
                    scaling.direction = %direction,
                    scaling.requested = requested,
                    scaling.applied = applied,
                    worker.type = worker_type.as_str(),
                    "Scaling action applied"
                );
            }
        }
    }

    pub fn log_scaling_decision(decision: &ScalingDecision) {
        if decision.direction == ScaleDirection::Maintain {
            debug!(
                event = "scaling_decision",
                scaling.direction = %decision.direction,
                scaling.current_size = decision.current_size,
                scaling.target_size = decision.target_size,
                scaling.triggered_by = decision.triggered_by.as_str(),
                scaling.reason = decision.reason.as_str(),
                "Scaling decision made"
            );
        } else {
            info!(
                event = "scaling_decision",
                scaling.direction = %decision.direction,
                scaling.current_size = decision.current_size,
                scaling.target_size = decision.target_size,
                scaling.triggered_by = decision.triggered_by.as_str(),
                scaling.reason = decision.reason.as_str(),
                "Scaling decision made"
            );
        }
    }

    pub fn log_system_event(event_type: &str, message: &str) {
        info!(event = "system_event", system.event_type = event_type, "{}", message);
    }

    pub fn log_system_error(component: &str, operation: &str, error: &dyn std::error::Error) {
        error!(
            event = "system_error",
            system.component = component,
            system.operation = operation,
            error.message = %error,
            "System error occurred"
        );
    }
}
