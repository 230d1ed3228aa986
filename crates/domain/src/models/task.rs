use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::priority_policy::PriorityLadder;

/// 任务定义
///
/// 表示控制平面中一个待执行的工作单元。创建后除 `priority` 外不再修改，
/// 优先级只会因饥饿保护或重试升级而被提升。
///
/// # 字段说明
///
/// - `id`: 任务唯一标识，在整个队列中唯一
/// - `name`: 人类可读名称
/// - `priority`: 四级优先级（LOW/NORMAL/HIGH/CRITICAL）
/// - `created_at`: 创建时间，FIFO 与饥饿保护都以此为准
/// - `deadline`: 可选截止时间，EDF 策略使用
/// - `estimated_duration_seconds`: 可选的预估执行时长
/// - `metadata`: 任意附加信息，由提交方定义
///
/// # 使用示例
///
/// ```rust
/// use orchestrator_domain::models::{Task, TaskPriority};
///
/// let task = Task::new("lint-repo", TaskPriority::High);
/// assert_eq!(task.priority, TaskPriority::High);
/// assert!(task.deadline.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub priority: TaskPriority,
    pub created_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub estimated_duration_seconds: Option<u64>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Task {
    /// 创建新任务，ID 自动生成
    pub fn new(name: impl Into<String>, priority: TaskPriority) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), name, priority, Utc::now())
    }

    /// 使用指定 ID 和创建时间创建任务
    pub fn with_id(
        id: impl Into<String>,
        name: impl Into<String>,
        priority: TaskPriority,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            priority,
            created_at,
            deadline: None,
            estimated_duration_seconds: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_estimated_duration(mut self, seconds: u64) -> Self {
        self.estimated_duration_seconds = Some(seconds);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// 任务已等待的秒数
    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_seconds()
    }
}

/// 任务优先级
///
/// 四级单调阶梯，`Ord` 按声明顺序比较：`Low < Normal < High < Critical`。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl PriorityLadder for TaskPriority {
    const TOP: Self = TaskPriority::Critical;

    fn rank(self) -> u8 {
        match self {
            TaskPriority::Low => 0,
            TaskPriority::Normal => 1,
            TaskPriority::High => 2,
            TaskPriority::Critical => 3,
        }
    }

    fn from_rank(rank: u8) -> Self {
        match rank {
            0 => TaskPriority::Low,
            1 => TaskPriority::Normal,
            2 => TaskPriority::High,
            _ => TaskPriority::Critical,
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskPriority::Low => "LOW",
            TaskPriority::Normal => "NORMAL",
            TaskPriority::High => "HIGH",
            TaskPriority::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

/// 队列优先级层
///
/// 队列管理器只使用三层粗粒度分级，比调度器的四级优先级更简单。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueTier {
    Low,
    Normal,
    High,
}

impl QueueTier {
    /// 出队扫描顺序：HIGH → NORMAL → LOW
    pub const SCAN_ORDER: [QueueTier; 3] = [QueueTier::High, QueueTier::Normal, QueueTier::Low];
}

impl PriorityLadder for QueueTier {
    const TOP: Self = QueueTier::High;

    fn rank(self) -> u8 {
        match self {
            QueueTier::Low => 0,
            QueueTier::Normal => 1,
            QueueTier::High => 2,
        }
    }

    fn from_rank(rank: u8) -> Self {
        match rank {
            0 => QueueTier::Low,
            1 => QueueTier::Normal,
            _ => QueueTier::High,
        }
    }
}

impl From<TaskPriority> for QueueTier {
    fn from(priority: TaskPriority) -> Self {
        match priority {
            TaskPriority::Critical | TaskPriority::High => QueueTier::High,
            TaskPriority::Normal => QueueTier::Normal,
            TaskPriority::Low => QueueTier::Low,
        }
    }
}

impl fmt::Display for QueueTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueueTier::Low => "LOW",
            QueueTier::Normal => "NORMAL",
            QueueTier::High => "HIGH",
        };
        write!(f, "{s}")
    }
}

/// 队列中任务的状态
///
/// ```text
/// QUEUED → ASSIGNED → IN_PROGRESS → {COMPLETED | FAILED | TIMEOUT}
///    ↑         │            │                        │
///    └─────────┴────────────┴──── 重试 ──────────────┘
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueuedTaskStatus {
    Queued,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Timeout,
}

impl QueuedTaskStatus {
    /// 状态转换表
    pub fn can_transition_to(self, to: QueuedTaskStatus) -> bool {
        use QueuedTaskStatus::*;
        matches!(
            (self, to),
            (Queued, Assigned)
                | (Assigned, InProgress)
                | (Assigned, Failed)
                | (Assigned, Queued)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Timeout)
                | (InProgress, Queued)
                | (Timeout, Queued)
                | (Timeout, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, QueuedTaskStatus::Completed | QueuedTaskStatus::Failed)
    }

    /// 处于某个 Worker 的分配集合中
    pub fn is_assigned(self) -> bool {
        matches!(
            self,
            QueuedTaskStatus::Assigned | QueuedTaskStatus::InProgress
        )
    }
}

/// 队列管理器持有的任务包装
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedTask {
    pub task: Task,
    pub tier: QueueTier,
    pub status: QueuedTaskStatus,
    pub queued_at: DateTime<Utc>,
    pub assigned_worker: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub timeout_seconds: u64,
    pub result: Option<serde_json::Value>,
    pub last_error: Option<String>,
}

impl QueuedTask {
    pub fn new(
        task: Task,
        tier: QueueTier,
        timeout_seconds: u64,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task,
            tier,
            status: QueuedTaskStatus::Queued,
            queued_at: now,
            assigned_worker: None,
            assigned_at: None,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries,
            timeout_seconds,
            result: None,
            last_error: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.task.id
    }

    /// 按状态转换表执行转换，非法转换返回错误且不修改状态
    pub fn transition(&mut self, to: QueuedTaskStatus) -> OrchestratorResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(OrchestratorError::invalid_transition(
                "task",
                self.task.id.clone(),
                self.status,
                to,
            ));
        }
        self.status = to;
        Ok(())
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// 执行中且自 `started_at` 起已超过 `timeout_seconds`
    pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
        if self.status != QueuedTaskStatus::InProgress {
            return false;
        }
        match self.started_at {
            Some(started_at) => {
                (now - started_at).num_seconds()
                    > i64::try_from(self.timeout_seconds).unwrap_or(i64::MAX)
            }
            None => false,
        }
    }

    pub fn wait_seconds(&self) -> Option<f64> {
        self.assigned_at
            .map(|assigned_at| (assigned_at - self.queued_at).num_milliseconds() as f64 / 1000.0)
    }

    pub fn execution_seconds(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => {
                Some((completed - started).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        }
    }

    pub fn reset_assignment(&mut self) {
        self.assigned_worker = None;
        self.assigned_at = None;
        self.started_at = None;
    }
}
