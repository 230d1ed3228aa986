use std::cmp::Ordering;

use tracing::debug;

use orchestrator_domain::models::{SchedulingStrategyKind, Task, TaskPriority};

/// 调度器持有的待调度任务
#[derive(Debug, Clone)]
pub struct PendingTask {
    pub task: Task,
    /// 提交时的原始优先级，饥饿保护总是从它重新计算
    pub original_priority: TaskPriority,
    /// 提交序号，所有排序规则的最终决胜条件
    pub seq: u64,
}

impl PendingTask {
    pub fn effective_priority(&self) -> TaskPriority {
        self.task.priority
    }

    /// 先比较 `created_at`，再比较提交序号
    fn fifo_cmp(&self, other: &PendingTask) -> Ordering {
        self.task
            .created_at
            .cmp(&other.task.created_at)
            .then(self.seq.cmp(&other.seq))
    }
}

/// 从待调度集合中选出下一个任务的策略
pub trait SchedulingStrategy: Send + Sync {
    /// 返回被选中任务在 `pending` 中的下标
    fn select(&self, pending: &[PendingTask], utilization: Option<f64>) -> Option<usize>;

    fn name(&self) -> &str;
}

fn select_min_by<F>(pending: &[PendingTask], mut compare: F) -> Option<usize>
where
    F: FnMut(&PendingTask, &PendingTask) -> Ordering,
{
    pending
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| compare(a, b))
        .map(|(index, _)| index)
}

/// 先到先服务，忽略优先级
#[derive(Debug, Default)]
pub struct FifoStrategy;

impl SchedulingStrategy for FifoStrategy {
    fn select(&self, pending: &[PendingTask], _utilization: Option<f64>) -> Option<usize> {
        select_min_by(pending, PendingTask::fifo_cmp)
    }

    fn name(&self) -> &str {
        "FIFO"
    }
}

/// 优先级最高者胜出，同优先级按创建时间
#[derive(Debug, Default)]
pub struct PriorityStrategy;

impl PriorityStrategy {
    fn compare(a: &PendingTask, b: &PendingTask) -> Ordering {
        b.effective_priority()
            .cmp(&a.effective_priority())
            .then_with(|| a.fifo_cmp(b))
    }
}

impl SchedulingStrategy for PriorityStrategy {
    fn select(&self, pending: &[PendingTask], _utilization: Option<f64>) -> Option<usize> {
        select_min_by(pending, Self::compare)
    }

    fn name(&self) -> &str {
        "PRIORITY"
    }
}

/// 最早截止时间优先，无截止时间的任务排在最后并按 FIFO 排序
#[derive(Debug, Default)]
pub struct EdfStrategy;

impl SchedulingStrategy for EdfStrategy {
    fn select(&self, pending: &[PendingTask], _utilization: Option<f64>) -> Option<usize> {
        select_min_by(pending, |a, b| match (a.task.deadline, b.task.deadline) {
            (Some(da), Some(db)) => da.cmp(&db).then_with(|| a.fifo_cmp(b)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.fifo_cmp(b),
        })
    }

    fn name(&self) -> &str {
        "EDF"
    }
}

/// 按池利用率切换的自适应策略
///
/// - 利用率 `> high_load_threshold`：过载保护，提交时即为 CRITICAL 的任务无条件优先，
///   其余按 PRIORITY 排序
/// - 利用率 `< low_load_threshold`：按 PRIORITY 排序
/// - 介于两者之间（含边界）：FIFO
#[derive(Debug)]
pub struct AdaptiveStrategy {
    high_load_threshold: f64,
    low_load_threshold: f64,
}

impl AdaptiveStrategy {
    pub fn new(high_load_threshold: f64, low_load_threshold: f64) -> Self {
        Self {
            high_load_threshold,
            low_load_threshold,
        }
    }
}

impl Default for AdaptiveStrategy {
    fn default() -> Self {
        Self::new(0.8, 0.5)
    }
}

impl SchedulingStrategy for AdaptiveStrategy {
    fn select(&self, pending: &[PendingTask], utilization: Option<f64>) -> Option<usize> {
        let utilization = utilization.unwrap_or(0.0);

        if utilization > self.high_load_threshold {
            debug!("池利用率 {:.2} 超过高负载阈值，启用过载保护", utilization);
            select_min_by(pending, |a, b| {
                let a_critical = a.original_priority == TaskPriority::Critical;
                let b_critical = b.original_priority == TaskPriority::Critical;
                b_critical
                    .cmp(&a_critical)
                    .then_with(|| PriorityStrategy::compare(a, b))
            })
        } else if utilization < self.low_load_threshold {
            select_min_by(pending, PriorityStrategy::compare)
        } else {
            select_min_by(pending, PendingTask::fifo_cmp)
        }
    }

    fn name(&self) -> &str {
        "ADAPTIVE"
    }
}

/// 按配置创建策略实例
pub fn strategy_for(
    kind: SchedulingStrategyKind,
    adaptive_high_load_threshold: f64,
    adaptive_low_load_threshold: f64,
) -> Box<dyn SchedulingStrategy> {
    match kind {
        SchedulingStrategyKind::Fifo => Box::new(FifoStrategy),
        SchedulingStrategyKind::Priority => Box::new(PriorityStrategy),
        SchedulingStrategyKind::Edf => Box::new(EdfStrategy),
        SchedulingStrategyKind::Adaptive => Box::new(AdaptiveStrategy::new(
            adaptive_high_load_threshold,
            adaptive_low_load_threshold,
        )),
    }
}
