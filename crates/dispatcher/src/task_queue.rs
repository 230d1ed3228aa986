use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use orchestrator_domain::events::{OrchestratorEvent, TaskEvent};
use orchestrator_domain::models::{QueueTier, QueuedTask, QueuedTaskStatus, Task};
use orchestrator_domain::ports::{Clock, EventSink, WorkerFailureHandler};
use orchestrator_domain::priority_policy::PriorityAdjustmentPolicy;
use orchestrator_errors::{OrchestratorError, OrchestratorResult};

/// 保留时长上限，约一百年
const MAX_RETENTION_HOURS: u64 = 876_000;

/// 任务队列配置
#[derive(Debug, Clone)]
pub struct TaskQueueConfig {
    /// 未显式指定时的执行超时（秒）
    pub default_timeout_seconds: u64,
    /// 未显式指定时的最大重试次数
    pub default_max_retries: u32,
    /// 执行耗时滑动窗口大小
    pub latency_window_size: usize,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            default_timeout_seconds: 3600,
            default_max_retries: 3,
            latency_window_size: 1000,
        }
    }
}

/// 执行耗时分位数（毫秒）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LatencyPercentiles {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub samples: usize,
}

impl LatencyPercentiles {
    /// 最近秩法计算分位数
    pub fn from_samples(samples: &VecDeque<f64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut sorted: Vec<f64> = samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let rank = |q: f64| -> f64 {
            let index = ((q * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len()) - 1;
            sorted[index]
        };
        Self {
            p50_ms: rank(0.50),
            p95_ms: rank(0.95),
            p99_ms: rank(0.99),
            samples: sorted.len(),
        }
    }
}

/// 队列统计
/// 超时扫描收回的任务及其原 Worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedOutTask {
    pub task_id: String,
    pub worker_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueMetrics {
    pub depth_by_tier: BTreeMap<QueueTier, usize>,
    pub queued: usize,
    pub assigned: usize,
    pub in_progress: usize,
    pub total_enqueued: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_retried: u64,
    pub total_timeouts: u64,
    pub avg_wait_seconds: f64,
    pub avg_execution_seconds: f64,
    pub latency: LatencyPercentiles,
    pub worker_loads: HashMap<String, usize>,
}

/// 锁内的完整队列状态
#[derive(Default)]
struct QueueState {
    tasks: HashMap<String, QueuedTask>,
    tiers: BTreeMap<QueueTier, VecDeque<String>>,
    worker_assignments: HashMap<String, HashSet<String>>,
    total_enqueued: u64,
    total_completed: u64,
    total_failed: u64,
    total_retried: u64,
    total_timeouts: u64,
    wait_seconds_sum: f64,
    wait_samples: u64,
    execution_seconds_sum: f64,
    execution_samples: u64,
    latency_window: VecDeque<f64>,
}

impl QueueState {
    fn new() -> Self {
        let mut state = Self::default();
        for tier in QueueTier::SCAN_ORDER {
            state.tiers.insert(tier, VecDeque::new());
        }
        state
    }

    fn push_to_tier(&mut self, tier: QueueTier, id: String) {
        self.tiers.entry(tier).or_default().push_back(id);
    }

    fn unassign(&mut self, worker_id: Option<&str>, task_id: &str) {
        if let Some(worker_id) = worker_id {
            if let Some(assigned) = self.worker_assignments.get_mut(worker_id) {
                assigned.remove(task_id);
                if assigned.is_empty() {
                    self.worker_assignments.remove(worker_id);
                }
            }
        }
    }

    fn record_execution(&mut self, seconds: f64, window_size: usize) {
        self.execution_seconds_sum += seconds;
        self.execution_samples += 1;
        self.latency_window.push_back(seconds * 1000.0);
        while self.latency_window.len() > window_size.max(1) {
            self.latency_window.pop_front();
        }
    }

    fn count_status(&self, status: QueuedTaskStatus) -> usize {
        self.tasks.values().filter(|t| t.status == status).count()
    }
}

/// 任务队列管理器
///
/// 三层优先级队列（HIGH/NORMAL/LOW），层内 FIFO，层间严格优先。
/// 每个队列任务要么位于某一层的队列中，要么位于某个 Worker 的分配集合中。
/// 所有复合读改写操作都在同一把锁内完成，事件在释放锁之后发布。
pub struct TaskQueueManager {
    state: RwLock<QueueState>,
    config: TaskQueueConfig,
    policy: PriorityAdjustmentPolicy,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
}

impl TaskQueueManager {
    pub fn new(
        config: TaskQueueConfig,
        policy: PriorityAdjustmentPolicy,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            state: RwLock::new(QueueState::new()),
            config,
            policy,
            clock,
            events,
        }
    }

    async fn publish_all(&self, events: Vec<OrchestratorEvent>) {
        for event in events {
            self.events.publish(event).await;
        }
    }

    /// 提交任务到指定层级的队尾
    ///
    /// 重复提交（ID 已被队列持有，包括尚未清理的终态任务）为空操作，返回已有 ID。
    pub async fn enqueue(
        &self,
        task: Task,
        tier: QueueTier,
        timeout_seconds: u64,
        max_retries: u32,
    ) -> String {
        let now = self.clock.now();
        let id = task.id.clone();
        {
            let mut state = self.state.write().await;
            if state.tasks.contains_key(&id) {
                debug!("忽略{}", OrchestratorError::DuplicateTask { id: id.clone() });
                return id;
            }
            let queued = QueuedTask::new(task, tier, timeout_seconds, max_retries, now);
            state.tasks.insert(id.clone(), queued);
            state.push_to_tier(tier, id.clone());
            state.total_enqueued += 1;
        }

        debug!("任务 {} 进入 {} 队列", id, tier);
        self.events
            .publish(OrchestratorEvent::task(
                TaskEvent::Queued {
                    task_id: id.clone(),
                    tier,
                    retry_count: 0,
                },
                now,
            ))
            .await;
        id
    }

    /// 使用默认超时与重试次数提交任务
    pub async fn enqueue_with_defaults(&self, task: Task, tier: QueueTier) -> String {
        self.enqueue(
            task,
            tier,
            self.config.default_timeout_seconds,
            self.config.default_max_retries,
        )
        .await
    }

    /// 按 HIGH→NORMAL→LOW 取出第一个非空层的队首任务并分配给 Worker
    pub async fn dequeue(&self, worker_id: &str) -> OrchestratorResult<Option<QueuedTask>> {
        let now = self.clock.now();
        let assigned = {
            let mut state = self.state.write().await;
            let mut picked = None;
            for tier in QueueTier::SCAN_ORDER {
                while let Some(id) = state.tiers.get_mut(&tier).and_then(|q| q.pop_front()) {
                    let is_queued = state
                        .tasks
                        .get(&id)
                        .is_some_and(|t| t.status == QueuedTaskStatus::Queued);
                    if is_queued {
                        picked = Some(id);
                        break;
                    }
                    warn!("队列中存在失效条目 {}，已跳过", id);
                }
                if picked.is_some() {
                    break;
                }
            }

            let Some(id) = picked else {
                return Ok(None);
            };

            let queued = match state.tasks.get_mut(&id) {
                Some(queued) => queued,
                None => return Ok(None),
            };
            queued.transition(QueuedTaskStatus::Assigned)?;
            queued.assigned_worker = Some(worker_id.to_string());
            queued.assigned_at = Some(now);
            let snapshot = queued.clone();

            if let Some(wait) = snapshot.wait_seconds() {
                state.wait_seconds_sum += wait;
                state.wait_samples += 1;
            }
            state
                .worker_assignments
                .entry(worker_id.to_string())
                .or_default()
                .insert(id);
            snapshot
        };

        debug!("任务 {} 分配给 Worker {}", assigned.id(), worker_id);
        self.events
            .publish(OrchestratorEvent::task(
                TaskEvent::Assigned {
                    task_id: assigned.id().to_string(),
                    worker_id: worker_id.to_string(),
                    tier: assigned.tier,
                },
                now,
            ))
            .await;
        Ok(Some(assigned))
    }

    /// 未知 ID 返回 `Ok(false)`，非法状态转换返回错误
    pub async fn mark_in_progress(&self, id: &str) -> OrchestratorResult<bool> {
        let now = self.clock.now();
        let worker_id = {
            let mut state = self.state.write().await;
            let Some(queued) = state.tasks.get_mut(id) else {
                return Ok(false);
            };
            queued.transition(QueuedTaskStatus::InProgress)?;
            queued.started_at = Some(now);
            queued.assigned_worker.clone()
        };

        self.events
            .publish(OrchestratorEvent::task(
                TaskEvent::Started {
                    task_id: id.to_string(),
                    worker_id,
                },
                now,
            ))
            .await;
        Ok(true)
    }

    pub async fn mark_completed(
        &self,
        id: &str,
        result: Option<serde_json::Value>,
    ) -> OrchestratorResult<bool> {
        let now = self.clock.now();
        let (worker_id, execution_seconds) = {
            let mut state = self.state.write().await;
            let Some(queued) = state.tasks.get_mut(id) else {
                return Ok(false);
            };
            queued.transition(QueuedTaskStatus::Completed)?;
            queued.completed_at = Some(now);
            queued.result = result;
            let worker_id = queued.assigned_worker.clone();
            let execution_seconds = queued.execution_seconds();

            state.unassign(worker_id.as_deref(), id);
            state.total_completed += 1;
            if let Some(seconds) = execution_seconds {
                state.record_execution(seconds, self.config.latency_window_size);
            }
            (worker_id, execution_seconds)
        };

        info!("任务 {} 执行完成", id);
        self.events
            .publish(OrchestratorEvent::task(
                TaskEvent::Completed {
                    task_id: id.to_string(),
                    worker_id,
                    execution_seconds,
                },
                now,
            ))
            .await;
        Ok(true)
    }

    /// 报告任务失败
    ///
    /// `retry` 为真且 `retry_count < max_retries` 时重试次数加一，提升一个层级后追加到该层队尾；
    /// 否则任务进入终态 FAILED。
    pub async fn mark_failed(&self, id: &str, error: &str, retry: bool) -> OrchestratorResult<bool> {
        let now = self.clock.now();
        let mut events = Vec::new();
        {
            let mut state = self.state.write().await;
            if !state.tasks.contains_key(id) {
                return Ok(false);
            }
            self.fail_locked(&mut state, id, error, retry, now, &mut events)?;
        }
        self.publish_all(events).await;
        Ok(true)
    }

    /// 失败处理，调用方必须持有写锁
    fn fail_locked(
        &self,
        state: &mut QueueState,
        id: &str,
        error: &str,
        retry: bool,
        now: DateTime<Utc>,
        events: &mut Vec<OrchestratorEvent>,
    ) -> OrchestratorResult<()> {
        let Some(queued) = state.tasks.get_mut(id) else {
            return Ok(());
        };
        let previous_worker = queued.assigned_worker.clone();

        if retry && queued.can_retry() {
            queued.transition(QueuedTaskStatus::Queued)?;
            queued.retry_count += 1;
            let from = queued.tier;
            let to = self.policy.escalated(from);
            queued.tier = to;
            queued.reset_assignment();
            queued.queued_at = now;
            queued.last_error = Some(error.to_string());
            let retry_count = queued.retry_count;

            state.unassign(previous_worker.as_deref(), id);
            state.push_to_tier(to, id.to_string());
            state.total_retried += 1;

            warn!(
                "任务 {} 失败，第 {} 次重试，队列层级 {} -> {}",
                id, retry_count, from, to
            );
            events.push(OrchestratorEvent::task(
                TaskEvent::Failed {
                    task_id: id.to_string(),
                    error: error.to_string(),
                    retry_count,
                    will_retry: true,
                },
                now,
            ));
            if to != from {
                events.push(OrchestratorEvent::task(
                    TaskEvent::Escalated {
                        task_id: id.to_string(),
                        from,
                        to,
                        retry_count,
                    },
                    now,
                ));
            }
            events.push(OrchestratorEvent::task(
                TaskEvent::Queued {
                    task_id: id.to_string(),
                    tier: to,
                    retry_count,
                },
                now,
            ));
        } else {
            queued.transition(QueuedTaskStatus::Failed)?;
            queued.completed_at = Some(now);
            queued.last_error = Some(error.to_string());
            let retry_count = queued.retry_count;
            let max_retries = queued.max_retries;

            state.unassign(previous_worker.as_deref(), id);
            state.total_failed += 1;

            events.push(OrchestratorEvent::task(
                TaskEvent::Failed {
                    task_id: id.to_string(),
                    error: error.to_string(),
                    retry_count,
                    will_retry: false,
                },
                now,
            ));
            if retry {
                let exhausted = OrchestratorError::RetryExhausted {
                    id: id.to_string(),
                    max_retries,
                };
                warn!("{}，已重试 {} 次: {}", exhausted, retry_count, error);
                events.push(OrchestratorEvent::task(
                    TaskEvent::RetryExhausted {
                        task_id: id.to_string(),
                        max_retries,
                        error: error.to_string(),
                    },
                    now,
                ));
            } else {
                warn!("任务 {} 失败且不再重试: {}", id, error);
            }
        }
        Ok(())
    }

    /// 超时扫描：执行中且超过 `timeout_seconds` 的任务标记为 TIMEOUT 后走重试流程
    pub async fn check_timeouts(&self) -> OrchestratorResult<Vec<TimedOutTask>> {
        let now = self.clock.now();
        let mut events = Vec::new();
        let timed_out = {
            let mut state = self.state.write().await;
            let timed_out: Vec<String> = state
                .tasks
                .values()
                .filter(|t| t.is_timed_out(now))
                .map(|t| t.id().to_string())
                .collect();

            let mut reclaimed = Vec::with_capacity(timed_out.len());
            for id in timed_out {
                let Some(queued) = state.tasks.get_mut(&id) else {
                    continue;
                };
                queued.transition(QueuedTaskStatus::Timeout)?;
                let timeout_seconds = queued.timeout_seconds;
                let worker_id = queued.assigned_worker.clone();
                state.total_timeouts += 1;

                events.push(OrchestratorEvent::task(
                    TaskEvent::TimedOut {
                        task_id: id.clone(),
                        worker_id: worker_id.clone(),
                        timeout_seconds,
                    },
                    now,
                ));
                let error = OrchestratorError::TimeoutExceeded {
                    id: id.clone(),
                    timeout_seconds,
                };
                self.fail_locked(
                    &mut state,
                    &id,
                    &error.to_string(),
                    error.is_retryable(),
                    now,
                    &mut events,
                )?;
                reclaimed.push(TimedOutTask {
                    task_id: id,
                    worker_id,
                });
            }
            reclaimed
        };

        if !timed_out.is_empty() {
            warn!("检测到 {} 个超时任务", timed_out.len());
        }
        self.publish_all(events).await;
        Ok(timed_out)
    }

    pub async fn get_task_status(&self, id: &str) -> Option<QueuedTaskStatus> {
        self.state.read().await.tasks.get(id).map(|t| t.status)
    }

    pub async fn get_task(&self, id: &str) -> Option<QueuedTask> {
        self.state.read().await.tasks.get(id).cloned()
    }

    /// Worker 当前分配（ASSIGNED 与 IN_PROGRESS）的任务数
    pub async fn get_worker_load(&self, worker_id: &str) -> usize {
        self.state
            .read()
            .await
            .worker_assignments
            .get(worker_id)
            .map_or(0, HashSet::len)
    }

    /// 所有层级中排队的任务总数
    pub async fn queue_depth(&self) -> usize {
        self.state.read().await.tiers.values().map(VecDeque::len).sum()
    }

    pub async fn get_metrics(&self) -> QueueMetrics {
        let state = self.state.read().await;
        let depth_by_tier: BTreeMap<QueueTier, usize> = state
            .tiers
            .iter()
            .map(|(tier, queue)| (*tier, queue.len()))
            .collect();
        let average = |sum: f64, count: u64| {
            if count == 0 {
                0.0
            } else {
                sum / count as f64
            }
        };

        QueueMetrics {
            queued: depth_by_tier.values().sum(),
            depth_by_tier,
            assigned: state.count_status(QueuedTaskStatus::Assigned),
            in_progress: state.count_status(QueuedTaskStatus::InProgress),
            total_enqueued: state.total_enqueued,
            total_completed: state.total_completed,
            total_failed: state.total_failed,
            total_retried: state.total_retried,
            total_timeouts: state.total_timeouts,
            avg_wait_seconds: average(state.wait_seconds_sum, state.wait_samples),
            avg_execution_seconds: average(state.execution_seconds_sum, state.execution_samples),
            latency: LatencyPercentiles::from_samples(&state.latency_window),
            worker_loads: state
                .worker_assignments
                .iter()
                .map(|(worker, tasks)| (worker.clone(), tasks.len()))
                .collect(),
        }
    }

    /// 清理完成时间早于 `max_age_hours` 的终态任务
    pub async fn cleanup_old_tasks(&self, max_age_hours: u64) -> usize {
        let hours = i64::try_from(max_age_hours.min(MAX_RETENTION_HOURS)).unwrap_or(0);
        let cutoff = self.clock.now() - Duration::hours(hours);
        let mut state = self.state.write().await;
        let before = state.tasks.len();
        state.tasks.retain(|_, t| {
            !(t.status.is_terminal() && t.completed_at.is_some_and(|at| at < cutoff))
        });
        let removed = before - state.tasks.len();
        if removed > 0 {
            info!("清理了 {} 个过期的终态任务", removed);
        }
        removed
    }
}

#[async_trait]
impl WorkerFailureHandler for TaskQueueManager {
    /// Worker 失联后，其名下所有任务走重试流程
    async fn handle_worker_failure(&self, worker_id: &str) -> OrchestratorResult<usize> {
        let now = self.clock.now();
        let mut events = Vec::new();
        let requeued = {
            let mut state = self.state.write().await;
            let task_ids: Vec<String> = state
                .worker_assignments
                .get(worker_id)
                .map(|ids| ids.iter().cloned().collect())
                .unwrap_or_default();
            for id in &task_ids {
                self.fail_locked(&mut state, id, "worker offline", true, now, &mut events)?;
            }
            task_ids.len()
        };

        if requeued > 0 {
            warn!("Worker {} 失联，{} 个任务进入重试流程", worker_id, requeued);
        }
        self.publish_all(events).await;
        Ok(requeued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_percentiles_nearest_rank() {
        let samples: VecDeque<f64> = (1..=100).map(|v| v as f64).collect();
        let p = LatencyPercentiles::from_samples(&samples);
        assert_eq!(p.p50_ms, 50.0);
        assert_eq!(p.p95_ms, 95.0);
        assert_eq!(p.p99_ms, 99.0);
        assert_eq!(p.samples, 100);

        let single: VecDeque<f64> = vec![7.0].into();
        let p = LatencyPercentiles::from_samples(&single);
        assert_eq!((p.p50_ms, p.p95_ms, p.p99_ms), (7.0, 7.0, 7.0));

        assert_eq!(
            LatencyPercentiles::from_samples(&VecDeque::new()),
            LatencyPercentiles::default()
        );
    }
}
