//! 领域事件
//!
//! 控制平面对外发布的结构化通知。核心只负责产生事件，投递由 [`crate::ports::EventSink`]
//! 的实现负责。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{QueueTier, ScaleDirection, ScalingDecision, WorkerStatus};

/// 领域事件基础trait
pub trait DomainEvent: Send + Sync {
    fn event_id(&self) -> Uuid;
    fn event_type(&self) -> &str;
    fn occurred_at(&self) -> DateTime<Utc>;
    fn aggregate_id(&self) -> String;
}

/// 任务相关事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TaskEvent {
    Queued {
        task_id: String,
        tier: QueueTier,
        retry_count: u32,
    },
    Assigned {
        task_id: String,
        worker_id: String,
        tier: QueueTier,
    },
    Started {
        task_id: String,
        worker_id: Option<String>,
    },
    Completed {
        task_id: String,
        worker_id: Option<String>,
        execution_seconds: Option<f64>,
    },
    Failed {
        task_id: String,
        error: String,
        retry_count: u32,
        will_retry: bool,
    },
    /// 重试时提升队列层级
    Escalated {
        task_id: String,
        from: QueueTier,
        to: QueueTier,
        retry_count: u32,
    },
    TimedOut {
        task_id: String,
        worker_id: Option<String>,
        timeout_seconds: u64,
    },
    /// 重试耗尽，需要人工或自动化介入
    RetryExhausted {
        task_id: String,
        max_retries: u32,
        error: String,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> &str {
        match self {
            TaskEvent::Queued { task_id, .. }
            | TaskEvent::Assigned { task_id, .. }
            | TaskEvent::Started { task_id, .. }
            | TaskEvent::Completed { task_id, .. }
            | TaskEvent::Failed { task_id, .. }
            | TaskEvent::Escalated { task_id, .. }
            | TaskEvent::TimedOut { task_id, .. }
            | TaskEvent::RetryExhausted { task_id, .. } => task_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            TaskEvent::Queued { .. } => "task.queued",
            TaskEvent::Assigned { .. } => "task.assigned",
            TaskEvent::Started { .. } => "task.started",
            TaskEvent::Completed { .. } => "task.completed",
            TaskEvent::Failed { .. } => "task.failed",
            TaskEvent::Escalated { .. } => "task.escalated",
            TaskEvent::TimedOut { .. } => "task.timed_out",
            TaskEvent::RetryExhausted { .. } => "task.retry_exhausted",
        }
    }
}

/// Worker相关事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum WorkerEvent {
    Registered {
        worker_id: String,
        worker_type: String,
    },
    Heartbeat {
        worker_id: String,
        status: WorkerStatus,
    },
    Offline {
        worker_id: String,
        heartbeat_age_seconds: i64,
    },
    Restarted {
        worker_id: String,
        restart_count: u32,
    },
    RestartLimitReached {
        worker_id: String,
        max_restarts: u32,
    },
    Stopping {
        worker_id: String,
    },
    Removed {
        worker_id: String,
    },
}

impl WorkerEvent {
    pub fn worker_id(&self) -> &str {
        match self {
            WorkerEvent::Registered { worker_id, .. }
            | WorkerEvent::Heartbeat { worker_id, .. }
            | WorkerEvent::Offline { worker_id, .. }
            | WorkerEvent::Restarted { worker_id, .. }
            | WorkerEvent::RestartLimitReached { worker_id, .. }
            | WorkerEvent::Stopping { worker_id }
            | WorkerEvent::Removed { worker_id } => worker_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            WorkerEvent::Registered { .. } => "worker.registered",
            WorkerEvent::Heartbeat { .. } => "worker.heartbeat",
            WorkerEvent::Offline { .. } => "worker.offline",
            WorkerEvent::Restarted { .. } => "worker.restarted",
            WorkerEvent::RestartLimitReached { .. } => "worker.restart_limit_reached",
            WorkerEvent::Stopping { .. } => "worker.stopping",
            WorkerEvent::Removed { .. } => "worker.removed",
        }
    }
}

/// 扩缩容相关事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ScalingEvent {
    DecisionMade {
        decision: ScalingDecision,
    },
    /// 池管理器实际执行的扩缩容，`applied` 可能小于 `requested`
    Applied {
        direction: ScaleDirection,
        requested: usize,
        applied: usize,
        worker_type: String,
    },
}

impl ScalingEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ScalingEvent::DecisionMade { .. } => "scaling.decision_made",
            ScalingEvent::Applied { .. } => "scaling.applied",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "category", content = "event", rename_all = "snake_case")]
pub enum EventPayload {
    Task(TaskEvent),
    Worker(WorkerEvent),
    Scaling(ScalingEvent),
}

/// 控制平面事件信封
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorEvent {
    pub id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub payload: EventPayload,
}

impl OrchestratorEvent {
    pub fn new(payload: EventPayload, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            occurred_at,
            payload,
        }
    }

    pub fn task(event: TaskEvent, occurred_at: DateTime<Utc>) -> Self {
        Self::new(EventPayload::Task(event), occurred_at)
    }

    pub fn worker(event: WorkerEvent, occurred_at: DateTime<Utc>) -> Self {
        Self::new(EventPayload::Worker(event), occurred_at)
    }

    pub fn scaling(event: ScalingEvent, occurred_at: DateTime<Utc>) -> Self {
        Self::new(EventPayload::Scaling(event), occurred_at)
    }

    pub fn as_task(&self) -> Option<&TaskEvent> {
        match &self.payload {
            EventPayload::Task(event) => Some(event),
            _ => None,
        }
    }

    pub fn as_worker(&self) -> Option<&WorkerEvent> {
        match &self.payload {
            EventPayload::Worker(event) => Some(event),
            _ => None,
        }
    }

    pub fn as_scaling(&self) -> Option<&ScalingEvent> {
        match &self.payload {
            EventPayload::Scaling(event) => Some(event),
            _ => None,
        }
    }
}

impl DomainEvent for OrchestratorEvent {
    fn event_id(&self) -> Uuid {
        self.id
    }

    fn event_type(&self) -> &str {
        match &self.payload {
            EventPayload::Task(event) => event.event_type(),
            EventPayload::Worker(event) => event.event_type(),
            EventPayload::Scaling(event) => event.event_type(),
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    fn aggregate_id(&self) -> String {
        match &self.payload {
            EventPayload::Task(event) => event.task_id().to_string(),
            EventPayload::Worker(event) => event.worker_id().to_string(),
            EventPayload::Scaling(_) => "pool".to_string(),
        }
    }
}
