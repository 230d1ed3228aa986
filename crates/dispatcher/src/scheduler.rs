use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use orchestrator_domain::models::{Task, TaskPriority};
use orchestrator_domain::ports::Clock;
use orchestrator_domain::priority_policy::PriorityAdjustmentPolicy;

use crate::strategies::{PendingTask, SchedulingStrategy};

/// 调度器统计
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerMetrics {
    pub strategy: String,
    pub total_submitted: u64,
    pub total_scheduled: u64,
    pub total_completed: u64,
    pub deadline_misses: u64,
    pub priority_boosts: u64,
    pub pending: usize,
}

/// 任务调度器
///
/// 按所选策略从待调度集合中挑出下一个任务，挑选前先执行饥饿保护。
/// 调度器本身不加锁，多方调用时由持有方用互斥锁包裹。
pub struct Scheduler {
    strategy: Box<dyn SchedulingStrategy>,
    policy: PriorityAdjustmentPolicy,
    clock: Arc<dyn Clock>,
    pending: Vec<PendingTask>,
    pending_ids: HashSet<String>,
    next_seq: u64,
    total_submitted: u64,
    total_scheduled: u64,
    total_completed: u64,
    deadline_misses: u64,
    priority_boosts: u64,
}

impl Scheduler {
    pub fn new(
        strategy: Box<dyn SchedulingStrategy>,
        policy: PriorityAdjustmentPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            strategy,
            policy,
            clock,
            pending: Vec::new(),
            pending_ids: HashSet::new(),
            next_seq: 0,
            total_submitted: 0,
            total_scheduled: 0,
            total_completed: 0,
            deadline_misses: 0,
            priority_boosts: 0,
        }
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// 添加任务，ID 已存在时为空操作并返回 `false`
    pub fn add_task(&mut self, task: Task) -> bool {
        if self.pending_ids.contains(&task.id) {
            debug!("任务 {} 已在待调度集合中，忽略重复提交", task.id);
            return false;
        }
        self.next_seq += 1;
        self.total_submitted += 1;
        self.pending_ids.insert(task.id.clone());
        self.pending.push(PendingTask {
            original_priority: task.priority,
            task,
            seq: self.next_seq,
        });
        true
    }

    pub fn remove_task(&mut self, id: &str) -> bool {
        if !self.pending_ids.remove(id) {
            return false;
        }
        self.pending.retain(|p| p.task.id != id);
        true
    }

    /// 取出下一个任务
    ///
    /// `current_pool_utilization` 取值 0–1，仅 ADAPTIVE 策略使用。返回的任务
    /// 携带提升后的有效优先级，并从待调度集合中移除。
    pub fn get_next_task(&mut self, current_pool_utilization: Option<f64>) -> Option<Task> {
        self.apply_starvation_prevention();

        let index = self
            .strategy
            .select(&self.pending, current_pool_utilization)?;
        let selected = self.pending.remove(index);
        self.pending_ids.remove(&selected.task.id);
        self.total_scheduled += 1;

        debug!(
            "{} 策略选中任务 {} (优先级: {}, 原始优先级: {})",
            self.strategy.name(),
            selected.task.id,
            selected.task.priority,
            selected.original_priority
        );

        Some(selected.task)
    }

    /// 按等待时长提升优先级，总是从原始优先级重新计算且不降级
    fn apply_starvation_prevention(&mut self) {
        let now = self.clock.now();
        for pending in &mut self.pending {
            let age = now - pending.task.created_at;
            let aged = self.policy.aged(pending.original_priority, age);
            if aged > pending.task.priority {
                info!(
                    "任务 {} 等待 {} 秒，优先级从 {} 提升到 {}",
                    pending.task.id,
                    age.num_seconds(),
                    pending.task.priority,
                    aged
                );
                pending.task.priority = aged;
                self.priority_boosts += 1;
            }
        }
    }

    pub fn mark_completed(&mut self, id: &str, missed_deadline: bool) {
        self.total_completed += 1;
        if missed_deadline {
            self.deadline_misses += 1;
            info!("任务 {} 错过截止时间", id);
        }
    }

    /// 按提交顺序返回待调度任务
    pub fn get_pending_tasks(&self) -> Vec<Task> {
        self.pending.iter().map(|p| p.task.clone()).collect()
    }

    /// 各有效优先级的待调度任务数，四个级别都会出现
    pub fn get_queue_depths(&self) -> BTreeMap<TaskPriority, usize> {
        let mut depths: BTreeMap<TaskPriority, usize> = [
            TaskPriority::Low,
            TaskPriority::Normal,
            TaskPriority::High,
            TaskPriority::Critical,
        ]
        .into_iter()
        .map(|p| (p, 0))
        .collect();
        for pending in &self.pending {
            *depths.entry(pending.task.priority).or_insert(0) += 1;
        }
        depths
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn get_metrics(&self) -> SchedulerMetrics {
        SchedulerMetrics {
            strategy: self.strategy.name().to_string(),
            total_submitted: self.total_submitted,
            total_scheduled: self.total_scheduled,
            total_completed: self.total_completed,
            deadline_misses: self.deadline_misses,
            priority_boosts: self.priority_boosts,
            pending: self.pending.len(),
        }
    }

    /// 清空待调度集合，历史计数保留
    pub fn clear(&mut self) {
        self.pending.clear();
        self.pending_ids.clear();
    }
}
