use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use serde::{Deserialize, Serialize};

/// Worker节点信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub worker_id: String,
    pub worker_type: String,
    pub status: WorkerStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub current_task: Option<String>,
    pub restart_count: u32,
    pub max_restarts: u32,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Worker状态
///
/// ```text
/// STARTING → IDLE ⇄ WORKING
///              │       │
///              ├───────┴──→ OFFLINE ──restart──→ STARTING
///              ├───────────→ ERROR   ──restart──→ STARTING
///              └──→ STOPPING
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    Starting,
    Idle,
    Working,
    Offline,
    Error,
    Stopping,
}

impl WorkerStatus {
    /// 状态转换表，相同状态之间的转换视为空操作
    pub fn can_transition_to(self, to: WorkerStatus) -> bool {
        use WorkerStatus::*;
        if self == to {
            return !matches!(self, Offline | Stopping);
        }
        matches!(
            (self, to),
            (Starting, Idle)
                | (Starting, Working)
                | (Starting, Offline)
                | (Starting, Error)
                | (Idle, Working)
                | (Idle, Offline)
                | (Idle, Error)
                | (Idle, Stopping)
                | (Working, Idle)
                | (Working, Offline)
                | (Working, Error)
                | (Offline, Starting)
                | (Error, Starting)
        )
    }

    /// 计入池容量的状态
    pub fn is_active(self) -> bool {
        matches!(
            self,
            WorkerStatus::Starting | WorkerStatus::Idle | WorkerStatus::Working
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Starting => "STARTING",
            WorkerStatus::Idle => "IDLE",
            WorkerStatus::Working => "WORKING",
            WorkerStatus::Offline => "OFFLINE",
            WorkerStatus::Error => "ERROR",
            WorkerStatus::Stopping => "STOPPING",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker心跳信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHeartbeat {
    pub status: WorkerStatus,
    pub tasks_completed: Option<u64>,
    pub tasks_failed: Option<u64>,
    pub current_task: Option<String>,
}

impl WorkerHeartbeat {
    pub fn new(status: WorkerStatus) -> Self {
        Self {
            status,
            tasks_completed: None,
            tasks_failed: None,
            current_task: None,
        }
    }

    pub fn with_tasks_completed(mut self, tasks_completed: u64) -> Self {
        self.tasks_completed = Some(tasks_completed);
        self
    }

    pub fn with_current_task(mut self, task_id: impl Into<String>) -> Self {
        self.current_task = Some(task_id.into());
        self
    }
}

impl WorkerInfo {
    /// 创建新的Worker信息
    pub fn new(
        worker_id: impl Into<String>,
        worker_type: impl Into<String>,
        status: WorkerStatus,
        max_restarts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            worker_type: worker_type.into(),
            status,
            registered_at: now,
            last_heartbeat: now,
            tasks_completed: 0,
            tasks_failed: 0,
            current_task: None,
            restart_count: 0,
            max_restarts,
            metadata: HashMap::new(),
        }
    }

    pub fn transition(&mut self, to: WorkerStatus) -> OrchestratorResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(OrchestratorError::invalid_transition(
                "worker",
                self.worker_id.clone(),
                self.status,
                to,
            ));
        }
        self.status = to;
        Ok(())
    }

    pub fn heartbeat_age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_heartbeat).num_seconds()
    }

    /// 检查心跳是否超时
    pub fn is_heartbeat_expired(&self, timeout_seconds: u64, now: DateTime<Utc>) -> bool {
        self.heartbeat_age_seconds(now) > i64::try_from(timeout_seconds).unwrap_or(i64::MAX)
    }

    pub fn can_restart(&self) -> bool {
        self.restart_count < self.max_restarts
    }

    pub fn is_available(
        &self,
        worker_type: Option<&str>,
        timeout_seconds: u64,
        now: DateTime<Utc>,
    ) -> bool {
        self.status == WorkerStatus::Idle
            && self.heartbeat_age_seconds(now)
                < i64::try_from(timeout_seconds).unwrap_or(i64::MAX)
            && worker_type.map_or(true, |t| t == self.worker_type)
    }
}
