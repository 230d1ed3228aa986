use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use orchestrator_domain::events::{OrchestratorEvent, ScalingEvent, WorkerEvent};
use orchestrator_domain::models::{
    ScaleDirection, ScalingAction, WorkerHeartbeat, WorkerInfo, WorkerStatus,
};
use orchestrator_domain::ports::{Clock, EventSink, WorkerProvisioner, WorkerReleaser};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};

/// Worker池管理配置
#[derive(Debug, Clone)]
pub struct PoolManagerConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    /// 每个活跃 Worker 期望承载的排队任务数
    pub target_queue_per_worker: usize,
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
    /// 心跳存活窗口（秒）
    pub heartbeat_timeout_seconds: u64,
    pub max_restarts: u32,
}

impl Default for PoolManagerConfig {
    fn default() -> Self {
        Self {
            min_workers: 1,
            max_workers: 10,
            target_queue_per_worker: 5,
            scale_up_threshold: 0.8,
            scale_down_threshold: 0.3,
            heartbeat_timeout_seconds: 30,
            max_restarts: 3,
        }
    }
}

/// 池统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolManagerMetrics {
    pub pool_size: usize,
    pub idle_workers: usize,
    pub working_workers: usize,
    pub pending_spawns: usize,
    /// 0–1，WORKING 占活跃 Worker 的比例
    pub utilization: f64,
    pub status_distribution: BTreeMap<String, usize>,
    pub type_distribution: BTreeMap<String, usize>,
    pub total_tasks_completed: u64,
    pub total_tasks_failed: u64,
    pub total_restarts: u64,
    pub total_scaled_up: u64,
    pub total_scaled_down: u64,
    pub total_offline_detections: u64,
    pub workers: Vec<WorkerInfo>,
}

#[derive(Default)]
struct PoolState {
    workers: HashMap<String, WorkerInfo>,
    /// 已预留但尚未完成 spawn 的名额
    pending_spawns: usize,
    total_restarts: u64,
    total_scaled_up: u64,
    total_scaled_down: u64,
    total_offline_detections: u64,
}

impl PoolState {
    fn active_count(&self) -> usize {
        self.workers.values().filter(|w| w.status.is_active()).count()
    }

    fn count_status(&self, status: WorkerStatus) -> usize {
        self.workers.values().filter(|w| w.status == status).count()
    }

    fn utilization(&self) -> f64 {
        let active = self.active_count();
        if active == 0 {
            return 0.0;
        }
        self.count_status(WorkerStatus::Working) as f64 / active as f64
    }
}

/// Worker池管理器
///
/// 维护 Worker 身份、健康与负载，并负责把扩缩容目标落实为具体的
/// spawn/terminate 调用。扩缩容的策略判断由 [`crate::Autoscaler`] 负责。
pub struct WorkerPoolManager {
    state: RwLock<PoolState>,
    config: PoolManagerConfig,
    provisioner: Arc<dyn WorkerProvisioner>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
}

impl WorkerPoolManager {
    pub fn new(
        config: PoolManagerConfig,
        provisioner: Arc<dyn WorkerProvisioner>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            state: RwLock::new(PoolState::default()),
            config,
            provisioner,
            clock,
            events,
        }
    }

    pub fn config(&self) -> &PoolManagerConfig {
        &self.config
    }

    async fn publish(&self, event: WorkerEvent, now: DateTime<Utc>) {
        self.events
            .publish(OrchestratorEvent::worker(event, now))
            .await;
    }

    async fn publish_all(&self, events: Vec<WorkerEvent>, now: DateTime<Utc>) {
        for event in events {
            self.publish(event, now).await;
        }
    }

    /// 注册 Worker
    ///
    /// 扩容时预登记为 STARTING 的 Worker 在此提升为 IDLE；其他已存在的 ID 视为重复注册，返回 `false`。
    pub async fn register_worker(
        &self,
        worker_id: &str,
        worker_type: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> OrchestratorResult<bool> {
        let now = self.clock.now();
        {
            let mut state = self.state.write().await;
            match state.workers.get_mut(worker_id) {
                Some(worker) if worker.status == WorkerStatus::Starting => {
                    worker.transition(WorkerStatus::Idle)?;
                    worker.worker_type = worker_type.to_string();
                    worker.metadata.extend(metadata);
                    worker.last_heartbeat = now;
                }
                Some(_) => {
                    debug!("Worker {} 已注册，忽略重复注册", worker_id);
                    return Ok(false);
                }
                None => {
                    let mut worker = WorkerInfo::new(
                        worker_id,
                        worker_type,
                        WorkerStatus::Idle,
                        self.config.max_restarts,
                        now,
                    );
                    worker.metadata = metadata;
                    state.workers.insert(worker_id.to_string(), worker);
                }
            }
        }

        info!("Worker {} 注册成功，类型: {}", worker_id, worker_type);
        self.publish(
            WorkerEvent::Registered {
                worker_id: worker_id.to_string(),
                worker_type: worker_type.to_string(),
            },
            now,
        )
        .await;
        Ok(true)
    }

    /// 处理心跳，未知 Worker 返回 `Ok(false)`
    pub async fn update_heartbeat(
        &self,
        worker_id: &str,
        heartbeat: WorkerHeartbeat,
    ) -> OrchestratorResult<bool> {
        let now = self.clock.now();
        {
            let mut state = self.state.write().await;
            let Some(worker) = state.workers.get_mut(worker_id) else {
                return Ok(false);
            };
            if worker.status != heartbeat.status {
                worker.transition(heartbeat.status)?;
            }
            worker.last_heartbeat = now;
            if let Some(completed) = heartbeat.tasks_completed {
                worker.tasks_completed = completed;
            }
            if let Some(failed) = heartbeat.tasks_failed {
                worker.tasks_failed = failed;
            }
            if heartbeat.current_task.is_some() || heartbeat.status == WorkerStatus::Idle {
                worker.current_task = heartbeat.current_task.clone();
            }
        }

        debug!("收到 Worker {} 心跳，状态: {}", worker_id, heartbeat.status);
        self.publish(
            WorkerEvent::Heartbeat {
                worker_id: worker_id.to_string(),
                status: heartbeat.status,
            },
            now,
        )
        .await;
        Ok(true)
    }

    /// 标记 Worker 离线，已离线时返回 `Ok(false)`
    pub async fn mark_worker_offline(&self, worker_id: &str) -> OrchestratorResult<bool> {
        let now = self.clock.now();
        let age = {
            let mut state = self.state.write().await;
            let Some(worker) = state.workers.get_mut(worker_id) else {
                return Ok(false);
            };
            if worker.status == WorkerStatus::Offline {
                return Ok(false);
            }
            worker.transition(WorkerStatus::Offline)?;
            worker.current_task = None;
            worker.heartbeat_age_seconds(now)
        };

        warn!("Worker {} 被标记为离线", worker_id);
        self.publish(
            WorkerEvent::Offline {
                worker_id: worker_id.to_string(),
                heartbeat_age_seconds: age,
            },
            now,
        )
        .await;
        Ok(true)
    }

    pub async fn remove_worker(&self, worker_id: &str) -> bool {
        let now = self.clock.now();
        let removed = self.state.write().await.workers.remove(worker_id).is_some();
        if removed {
            info!("Worker {} 已从池中移除", worker_id);
            self.publish(
                WorkerEvent::Removed {
                    worker_id: worker_id.to_string(),
                },
                now,
            )
            .await;
        }
        removed
    }

    /// 选出空闲且心跳新鲜、已完成任务最少的 Worker，并标记为 WORKING
    pub async fn get_available_worker(&self, worker_type: Option<&str>) -> Option<String> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let timeout = self.config.heartbeat_timeout_seconds;
        let worker_id = state
            .workers
            .values()
            .filter(|w| w.is_available(worker_type, timeout, now))
            .min_by(|a, b| {
                a.tasks_completed
                    .cmp(&b.tasks_completed)
                    .then_with(|| a.worker_id.cmp(&b.worker_id))
            })
            .map(|w| w.worker_id.clone())?;

        let worker = state.workers.get_mut(&worker_id)?;
        if let Err(e) = worker.transition(WorkerStatus::Working) {
            error!("Worker {} 无法进入工作状态: {}", worker_id, e);
            return None;
        }
        debug!("选中 Worker {}", worker_id);
        Some(worker_id)
    }

    /// 记录 Worker 当前执行的任务
    pub async fn set_current_task(&self, worker_id: &str, task_id: Option<String>) -> bool {
        let mut state = self.state.write().await;
        match state.workers.get_mut(worker_id) {
            Some(worker) => {
                worker.current_task = task_id;
                true
            }
            None => false,
        }
    }

    /// WORKING 的 Worker 回到 IDLE 并累计成功或失败次数
    pub async fn release_worker(&self, worker_id: &str, success: bool) -> OrchestratorResult<bool> {
        let mut state = self.state.write().await;
        let Some(worker) = state.workers.get_mut(worker_id) else {
            return Ok(false);
        };
        worker.transition(WorkerStatus::Idle)?;
        worker.current_task = None;
        if success {
            worker.tasks_completed += 1;
        } else {
            worker.tasks_failed += 1;
        }
        Ok(true)
    }

    /// 选中后未分到任务的 Worker 直接退回 IDLE，不计入完成次数
    pub async fn return_worker(&self, worker_id: &str) -> OrchestratorResult<bool> {
        let mut state = self.state.write().await;
        let Some(worker) = state.workers.get_mut(worker_id) else {
            return Ok(false);
        };
        worker.transition(WorkerStatus::Idle)?;
        worker.current_task = None;
        Ok(true)
    }

    /// 把心跳超时的活跃 Worker 标记为离线，返回本次新离线的 ID
    ///
    /// 已离线的 Worker 不会再次返回。
    pub async fn check_worker_health(&self) -> Vec<String> {
        let now = self.clock.now();
        let timeout = self.config.heartbeat_timeout_seconds;
        let mut events = Vec::new();
        let offline = {
            let mut state = self.state.write().await;
            let mut offline = Vec::new();
            for worker in state.workers.values_mut() {
                if !worker.status.is_active() || !worker.is_heartbeat_expired(timeout, now) {
                    continue;
                }
                if let Err(e) = worker.transition(WorkerStatus::Offline) {
                    error!("Worker {} 离线状态转换失败: {}", worker.worker_id, e);
                    continue;
                }
                worker.current_task = None;
                let age = worker.heartbeat_age_seconds(now);
                warn!(
                    "Worker {} 心跳超时 {} 秒，标记为离线",
                    worker.worker_id, age
                );
                events.push(WorkerEvent::Offline {
                    worker_id: worker.worker_id.clone(),
                    heartbeat_age_seconds: age,
                });
                offline.push(worker.worker_id.clone());
            }
            state.total_offline_detections += offline.len() as u64;
            offline
        };

        self.publish_all(events, now).await;
        offline
    }

    /// 重启离线或出错的 Worker
    ///
    /// 达到 `max_restarts` 后返回 `Ok(false)` 并发出重启上限事件，需要外部介入。
    pub async fn restart_worker(&self, worker_id: &str) -> OrchestratorResult<bool> {
        let now = self.clock.now();
        let event = {
            let mut state = self.state.write().await;
            let Some(worker) = state.workers.get_mut(worker_id) else {
                return Ok(false);
            };
            if worker.can_restart() {
                worker.transition(WorkerStatus::Starting)?;
                worker.restart_count += 1;
                worker.last_heartbeat = now;
                let restart_count = worker.restart_count;
                state.total_restarts += 1;
                info!("Worker {} 第 {} 次重启", worker_id, restart_count);
                WorkerEvent::Restarted {
                    worker_id: worker_id.to_string(),
                    restart_count,
                }
            } else {
                let limit = OrchestratorError::RestartLimitReached {
                    id: worker_id.to_string(),
                    max_restarts: worker.max_restarts,
                };
                error!("{}，需要人工介入", limit);
                WorkerEvent::RestartLimitReached {
                    worker_id: worker_id.to_string(),
                    max_restarts: worker.max_restarts,
                }
            }
        };

        let restarted = matches!(event, WorkerEvent::Restarted { .. });
        self.publish(event, now).await;
        Ok(restarted)
    }

    /// 仅依据队列深度计算扩缩容动作
    pub async fn calculate_scaling_decision(&self, queue_depth: usize) -> ScalingAction {
        let state = self.state.read().await;
        let active = state.active_count() + state.pending_spawns;
        self.scaling_action_for(active, queue_depth)
    }

    fn scaling_action_for(&self, active: usize, queue_depth: usize) -> ScalingAction {
        let min = self.config.min_workers;
        let max = self.config.max_workers.max(min);
        let per_worker = self.config.target_queue_per_worker.max(1);

        if active < min {
            return ScalingAction::up(min - active);
        }
        let needed = queue_depth.div_ceil(per_worker);
        if active == 0 {
            return if needed > 0 && max > 0 {
                ScalingAction::up(needed.min(max))
            } else {
                ScalingAction::none()
            };
        }

        let utilization = queue_depth as f64 / (active * per_worker) as f64;
        if utilization > self.config.scale_up_threshold && active < max {
            let count = needed.saturating_sub(active).max(1).min(max - active);
            return ScalingAction::up(count);
        }
        if utilization < self.config.scale_down_threshold && active > min {
            let count = active
                .saturating_sub(needed.max(min))
                .max(1)
                .min(active - min);
            return ScalingAction::down(count);
        }
        ScalingAction::none()
    }

    /// 执行扩缩容，返回实际请求的 Worker 数
    ///
    /// 数量始终被限制在 `[min_workers, max_workers]` 之内。扩容时先在锁内预留名额，
    /// 再在锁外调用 spawn；缩容只挑选 IDLE 的 Worker。
    pub async fn apply_scaling_decision(
        &self,
        direction: ScaleDirection,
        count: usize,
        worker_type: &str,
    ) -> usize {
        match direction {
            ScaleDirection::ScaleUp => self.scale_up(count, worker_type).await,
            ScaleDirection::ScaleDown => self.scale_down(count, worker_type).await,
            ScaleDirection::Maintain => 0,
        }
    }

    async fn scale_up(&self, count: usize, worker_type: &str) -> usize {
        let requested = {
            let mut state = self.state.write().await;
            let current = state.active_count() + state.pending_spawns;
            let headroom = self.config.max_workers.saturating_sub(current);
            let requested = count.min(headroom);
            state.pending_spawns += requested;
            requested
        };
        if requested == 0 {
            let exhausted = OrchestratorError::CapacityExhausted(format!(
                "池已达上限 {}",
                self.config.max_workers
            ));
            debug!("{}，跳过扩容", exhausted);
            return 0;
        }

        info!("扩容 {} 个 {} 类型的 Worker", requested, worker_type);
        let results = join_all((0..requested).map(|_| self.provisioner.spawn(worker_type))).await;

        let now = self.clock.now();
        let mut spawned = Vec::new();
        {
            let mut state = self.state.write().await;
            state.pending_spawns = state.pending_spawns.saturating_sub(requested);
            for result in results {
                match result {
                    Ok(worker_id) => {
                        let worker = WorkerInfo::new(
                            worker_id.clone(),
                            worker_type,
                            WorkerStatus::Starting,
                            self.config.max_restarts,
                            now,
                        );
                        state.workers.insert(worker_id.clone(), worker);
                        spawned.push(worker_id);
                    }
                    Err(e) if e.is_retryable() => warn!("启动 Worker 失败，等待下次扩容: {}", e),
                    Err(e) => error!("启动 Worker 失败: {}", e),
                }
            }
            state.total_scaled_up += spawned.len() as u64;
        }

        let applied = spawned.len();
        let events = spawned
            .into_iter()
            .map(|worker_id| WorkerEvent::Registered {
                worker_id,
                worker_type: worker_type.to_string(),
            })
            .collect();
        self.publish_all(events, now).await;
        self.publish_applied(ScaleDirection::ScaleUp, requested, applied, worker_type, now)
            .await;
        requested
    }

    async fn scale_down(&self, count: usize, worker_type: &str) -> usize {
        let now = self.clock.now();
        let stopping = {
            let mut state = self.state.write().await;
            let removable = state.active_count().saturating_sub(self.config.min_workers);
            let limit = count.min(removable);

            let mut candidates: Vec<(u64, String)> = state
                .workers
                .values()
                .filter(|w| w.status == WorkerStatus::Idle && w.worker_type == worker_type)
                .map(|w| (w.tasks_completed, w.worker_id.clone()))
                .collect();
            candidates.sort();

            let mut stopping = Vec::new();
            for (_, worker_id) in candidates.into_iter().take(limit) {
                if let Some(worker) = state.workers.get_mut(&worker_id) {
                    if worker.transition(WorkerStatus::Stopping).is_ok() {
                        stopping.push(worker_id);
                    }
                }
            }
            state.total_scaled_down += stopping.len() as u64;
            stopping
        };
        if stopping.is_empty() {
            debug!("没有可缩容的空闲 Worker");
            return 0;
        }

        info!("缩容 {} 个 Worker: {:?}", stopping.len(), stopping);
        self.publish_all(
            stopping
                .iter()
                .map(|id| WorkerEvent::Stopping {
                    worker_id: id.clone(),
                })
                .collect(),
            now,
        )
        .await;

        let results = join_all(stopping.iter().map(|id| self.provisioner.terminate(id))).await;
        let mut terminated = 0;
        for (worker_id, result) in stopping.iter().zip(results) {
            match result {
                Ok(()) => {
                    self.remove_worker(worker_id).await;
                    terminated += 1;
                }
                Err(e) => error!("终止 Worker {} 失败: {}", worker_id, e),
            }
        }

        self.publish_applied(
            ScaleDirection::ScaleDown,
            stopping.len(),
            terminated,
            worker_type,
            now,
        )
        .await;
        stopping.len()
    }

    async fn publish_applied(
        &self,
        direction: ScaleDirection,
        requested: usize,
        applied: usize,
        worker_type: &str,
        now: DateTime<Utc>,
    ) {
        self.events
            .publish(OrchestratorEvent::scaling(
                ScalingEvent::Applied {
                    direction,
                    requested,
                    applied,
                    worker_type: worker_type.to_string(),
                },
                now,
            ))
            .await;
    }

    /// 活跃（STARTING/IDLE/WORKING）Worker 数
    pub async fn pool_size(&self) -> usize {
        self.state.read().await.active_count()
    }

    pub async fn utilization(&self) -> f64 {
        self.state.read().await.utilization()
    }

    pub async fn get_worker(&self, worker_id: &str) -> Option<WorkerInfo> {
        self.state.read().await.workers.get(worker_id).cloned()
    }

    pub async fn workers_with_status(&self, status: WorkerStatus) -> Vec<String> {
        let state = self.state.read().await;
        let mut ids: Vec<String> = state
            .workers
            .values()
            .filter(|w| w.status == status)
            .map(|w| w.worker_id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub async fn get_metrics(&self) -> PoolManagerMetrics {
        let state = self.state.read().await;
        let mut status_distribution = BTreeMap::new();
        let mut type_distribution = BTreeMap::new();
        for worker in state.workers.values() {
            *status_distribution
                .entry(worker.status.as_str().to_string())
                .or_insert(0) += 1;
            *type_distribution
                .entry(worker.worker_type.clone())
                .or_insert(0) += 1;
        }
        let mut workers: Vec<WorkerInfo> = state.workers.values().cloned().collect();
        workers.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));

        PoolManagerMetrics {
            pool_size: state.active_count(),
            idle_workers: state.count_status(WorkerStatus::Idle),
            working_workers: state.count_status(WorkerStatus::Working),
            pending_spawns: state.pending_spawns,
            utilization: state.utilization(),
            status_distribution,
            type_distribution,
            total_tasks_completed: workers.iter().map(|w| w.tasks_completed).sum(),
            total_tasks_failed: workers.iter().map(|w| w.tasks_failed).sum(),
            total_restarts: state.total_restarts,
            total_scaled_up: state.total_scaled_up,
            total_scaled_down: state.total_scaled_down,
            total_offline_detections: state.total_offline_detections,
            workers,
        }
    }
}

#[async_trait]
impl WorkerReleaser for WorkerPoolManager {
    async fn release_worker(&self, worker_id: &str, success: bool) -> OrchestratorResult<bool> {
        WorkerPoolManager::release_worker(self, worker_id, success).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_domain::ports::{NoopEventSink, SystemClock};

    struct NoProvisioner;

    #[async_trait]
    impl WorkerProvisioner for NoProvisioner {
        async fn spawn(&self, _worker_type: &str) -> OrchestratorResult<String> {
            Err(OrchestratorError::provisioning("disabled"))
        }

        async fn terminate(&self, _worker_id: &str) -> OrchestratorResult<()> {
            Ok(())
        }
    }

    fn manager(config: PoolManagerConfig) -> WorkerPoolManager {
        WorkerPoolManager::new(
            config,
            Arc::new(NoProvisioner),
            Arc::new(SystemClock),
            Arc::new(NoopEventSink),
        )
    }

    #[test]
    fn test_scaling_action_from_queue_depth() {
        let pool = manager(PoolManagerConfig {
            min_workers: 2,
            max_workers: 10,
            target_queue_per_worker: 5,
            scale_up_threshold: 0.8,
            scale_down_threshold: 0.3,
            ..PoolManagerConfig::default()
        });

        // 低于下限时直接补足
        assert_eq!(pool.scaling_action_for(0, 0), ScalingAction::up(2));
        assert_eq!(pool.scaling_action_for(1, 0), ScalingAction::up(1));
        // 4 个 Worker 容量 20，排队 30 需要 6 个
        assert_eq!(pool.scaling_action_for(4, 30), ScalingAction::up(2));
        // 超出上限的需求被截断
        assert_eq!(pool.scaling_action_for(8, 200), ScalingAction::up(2));
        assert_eq!(pool.scaling_action_for(10, 200), ScalingAction::none());
        // 利用率 0.5 处于两阈值之间
        assert_eq!(pool.scaling_action_for(4, 10), ScalingAction::none());
        // 空队列缩到下限
        assert_eq!(pool.scaling_action_for(6, 0), ScalingAction::down(4));
        assert_eq!(pool.scaling_action_for(2, 0), ScalingAction::none());
    }

    #[test]
    fn test_scaling_action_without_floor() {
        let pool = manager(PoolManagerConfig {
            min_workers: 0,
            max_workers: 3,
            ..PoolManagerConfig::default()
        });
        assert_eq!(pool.scaling_action_for(0, 0), ScalingAction::none());
        assert_eq!(pool.scaling_action_for(0, 7), ScalingAction::up(2));
        assert_eq!(pool.scaling_action_for(0, 100), ScalingAction::up(3));
    }

    #[tokio::test]
    async fn test_failed_spawns_release_reservation() {
        let pool = manager(PoolManagerConfig::default());
        let requested = pool
            .apply_scaling_decision(ScaleDirection::ScaleUp, 3, "default")
            .await;
        assert_eq!(requested, 3);
        let metrics = pool.get_metrics().await;
        assert_eq!(metrics.pending_spawns, 0);
        assert_eq!(metrics.pool_size, 0);
        assert_eq!(metrics.total_scaled_up, 0);
    }
}
