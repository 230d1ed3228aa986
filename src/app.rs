use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use orchestrator_config::AppConfig;
use orchestrator_dispatcher::{
    strategy_for, RetentionCleaner, Scheduler, TaskQueueConfig, TaskQueueManager, TimeoutSweeper,
};
use orchestrator_domain::models::{QueueTier, Task};
use orchestrator_domain::ports::{
    Clock, EventSink, IntervalTicker, MetricsSource, Ticker, WorkerFailureHandler,
    WorkerProvisioner, WorkerReleaser,
};
use orchestrator_domain::priority_policy::PriorityAdjustmentPolicy;
use orchestrator_errors::OrchestratorResult;
use orchestrator_observability::{EventPublisher, MetricsCollector};
use orchestrator_pool::{
    Autoscaler, AutoscalerSettings, HealthMonitor, PoolManagerConfig, ScalingController,
    WorkerPoolManager,
};

use crate::metrics_sampler::PoolMetricsSampler;

/// 一个分发周期的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// 从调度器移入队列的任务ID
    pub admitted: Vec<String>,
    /// (任务ID, Worker ID)
    pub assignments: Vec<(String, String)>,
}

/// 各后台循环使用的节拍源
pub struct LoopTickers {
    pub dispatch: Box<dyn Ticker>,
    pub timeout: Box<dyn Ticker>,
    pub cleanup: Box<dyn Ticker>,
    pub health: Box<dyn Ticker>,
    pub scaling: Box<dyn Ticker>,
}

impl LoopTickers {
    /// 按配置的周期创建真实时间节拍源，必须在 tokio 运行时内调用
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            dispatch: Box::new(IntervalTicker::from_millis(config.dispatch.interval_millis)),
            timeout: Box::new(IntervalTicker::from_secs(
                config.queue.timeout_check_interval_seconds,
            )),
            cleanup: Box::new(IntervalTicker::from_secs(config.queue.cleanup_interval_seconds)),
            health: Box::new(IntervalTicker::from_secs(
                config.pool.health_check_interval_seconds,
            )),
            scaling: Box::new(IntervalTicker::from_secs(
                config.autoscaler.evaluation_interval_seconds,
            )),
        }
    }
}

/// 控制平面组合根
///
/// 组装调度器、任务队列、Worker池与自动扩缩容器，并驱动它们的后台循环。
pub struct Application {
    config: AppConfig,
    clock: Arc<dyn Clock>,
    events: Arc<EventPublisher>,
    metrics: Arc<MetricsCollector>,
    scheduler: Mutex<Scheduler>,
    queue: Arc<TaskQueueManager>,
    pool: Arc<WorkerPoolManager>,
    autoscaler: Option<Arc<Autoscaler>>,
    metrics_source: Arc<dyn MetricsSource>,
}

impl Application {
    pub fn new(
        config: AppConfig,
        provisioner: Arc<dyn WorkerProvisioner>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        info!(
            "初始化控制平面，调度策略: {}，池规模: {}-{}",
            config.scheduler.strategy, config.pool.min_workers, config.pool.max_workers
        );

        let metrics = Arc::new(MetricsCollector::new());
        let events = Arc::new(EventPublisher::new(
            config.observability.event_channel_capacity,
            Arc::clone(&metrics),
        ));
        let sink: Arc<dyn EventSink> = events.clone();
        let policy = PriorityAdjustmentPolicy::new(config.scheduler.starvation_threshold_seconds);

        let scheduler = Scheduler::new(
            strategy_for(
                config.scheduler.strategy,
                config.scheduler.adaptive_high_load_threshold,
                config.scheduler.adaptive_low_load_threshold,
            ),
            policy,
            Arc::clone(&clock),
        );

        let queue = Arc::new(TaskQueueManager::new(
            TaskQueueConfig {
                default_timeout_seconds: config.queue.default_timeout_seconds,
                default_max_retries: config.queue.default_max_retries,
                latency_window_size: config.queue.latency_window_size,
            },
            policy,
            Arc::clone(&clock),
            Arc::clone(&sink),
        ));

        let pool = Arc::new(WorkerPoolManager::new(
            PoolManagerConfig {
                min_workers: config.pool.min_workers,
                max_workers: config.pool.max_workers,
                target_queue_per_worker: config.pool.target_queue_per_worker,
                scale_up_threshold: config.pool.scale_up_threshold,
                scale_down_threshold: config.pool.scale_down_threshold,
                heartbeat_timeout_seconds: config.pool.heartbeat_timeout_seconds,
                max_restarts: config.pool.max_restarts,
            },
            provisioner,
            Arc::clone(&clock),
            Arc::clone(&sink),
        ));

        let autoscaler = if config.autoscaler.enabled {
            Some(Arc::new(Autoscaler::new(
                config.autoscaler.policy.clone(),
                AutoscalerSettings {
                    queue_depth_threshold: config.autoscaler.queue_depth_threshold,
                    latency_ratio_threshold: config.autoscaler.latency_ratio_threshold,
                    history_limit: config.autoscaler.history_limit,
                },
                Arc::clone(&clock),
                Arc::clone(&sink),
            )))
        } else {
            info!("自动扩缩容已关闭，按队列深度计算池规模");
            None
        };

        let metrics_source: Arc<dyn MetricsSource> = Arc::new(PoolMetricsSampler::new(
            Arc::clone(&queue),
            Arc::clone(&pool),
            Arc::clone(&clock),
            Arc::clone(&metrics),
        ));

        Ok(Self {
            config,
            clock,
            events,
            metrics,
            scheduler: Mutex::new(scheduler),
            queue,
            pool,
            autoscaler,
            metrics_source,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventPublisher> {
        &self.events
    }

    pub fn queue(&self) -> &Arc<TaskQueueManager> {
        &self.queue
    }

    pub fn pool(&self) -> &Arc<WorkerPoolManager> {
        &self.pool
    }

    pub fn autoscaler(&self) -> Option<&Arc<Autoscaler>> {
        self.autoscaler.as_ref()
    }

    pub fn scheduler(&self) -> &Mutex<Scheduler> {
        &self.scheduler
    }

    /// 提交任务到调度器，重复的任务ID返回 `false`
    pub async fn submit_task(&self, task: Task) -> bool {
        let id = task.id.clone();
        let added = self.scheduler.lock().await.add_task(task);
        if added {
            debug!("任务 {} 已提交到调度器", id);
        }
        added
    }

    /// 执行一个分发周期：先把调度器选出的任务移入队列，再把队列任务分配给空闲 Worker
    pub async fn dispatch_once(&self) -> DispatchReport {
        let mut report = DispatchReport::default();

        let utilization = self.pool.utilization().await;
        let admitted: Vec<Task> = {
            let mut scheduler = self.scheduler.lock().await;
            let mut batch = Vec::new();
            while batch.len() < self.config.scheduler.admission_batch_size {
                match scheduler.get_next_task(Some(utilization)) {
                    Some(task) => batch.push(task),
                    None => break,
                }
            }
            batch
        };
        for task in admitted {
            let tier = QueueTier::from(task.priority);
            let id = self.queue.enqueue_with_defaults(task, tier).await;
            report.admitted.push(id);
        }

        for _ in 0..self.config.dispatch.max_assignments_per_tick {
            let Some(worker_id) = self.pool.get_available_worker(None).await else {
                break;
            };
            match self.queue.dequeue(&worker_id).await {
                Ok(Some(queued)) => {
                    let task_id = queued.task.id.clone();
                    self.pool
                        .set_current_task(&worker_id, Some(task_id.clone()))
                        .await;
                    if let Some(wait) = queued.wait_seconds() {
                        self.metrics.record_wait_time(queued.tier, wait);
                    }
                    report.assignments.push((task_id, worker_id));
                }
                Ok(None) => {
                    self.release_unused_worker(&worker_id).await;
                    break;
                }
                Err(e) => {
                    error!("为 Worker {} 出队失败: {}", worker_id, e);
                    self.release_unused_worker(&worker_id).await;
                    break;
                }
            }
        }

        if !report.admitted.is_empty() || !report.assignments.is_empty() {
            debug!(
                "分发周期完成: 入队 {}，分配 {}",
                report.admitted.len(),
                report.assignments.len()
            );
        }
        report
    }

    async fn release_unused_worker(&self, worker_id: &str) {
        if let Err(e) = self.pool.return_worker(worker_id).await {
            warn!("归还 Worker {} 失败: {}", worker_id, e);
        }
    }

    /// Worker 报告任务开始执行
    pub async fn start_task(&self, task_id: &str) -> OrchestratorResult<bool> {
        self.queue.mark_in_progress(task_id).await
    }

    /// Worker 报告任务完成
    pub async fn complete_task(
        &self,
        task_id: &str,
        result: Option<serde_json::Value>,
    ) -> OrchestratorResult<bool> {
        let Some(queued) = self.queue.get_task(task_id).await else {
            return Ok(false);
        };
        if !self.queue.mark_completed(task_id, result).await? {
            return Ok(false);
        }

        let now = self.clock.now();
        let missed_deadline = queued.task.deadline.is_some_and(|deadline| now > deadline);
        self.scheduler
            .lock()
            .await
            .mark_completed(task_id, missed_deadline);

        if let Some(worker_id) = queued.assigned_worker {
            self.pool.release_worker(&worker_id, true).await?;
        }
        Ok(true)
    }

    /// Worker 报告任务失败，`retry` 为真时按重试流程重新入队
    pub async fn fail_task(
        &self,
        task_id: &str,
        error: &str,
        retry: bool,
    ) -> OrchestratorResult<bool> {
        let Some(queued) = self.queue.get_task(task_id).await else {
            return Ok(false);
        };
        if !self.queue.mark_failed(task_id, error, retry).await? {
            return Ok(false);
        }
        if let Some(worker_id) = queued.assigned_worker {
            self.pool.release_worker(&worker_id, false).await?;
        }
        Ok(true)
    }

    /// 运行所有后台循环，直到收到关闭信号
    pub async fn run(
        self: Arc<Self>,
        tickers: LoopTickers,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        info!("启动控制平面后台循环");
        let LoopTickers {
            dispatch,
            timeout,
            cleanup,
            health,
            scaling,
        } = tickers;

        let dispatch_handle = {
            let app = Arc::clone(&self);
            let shutdown_rx = shutdown_rx.resubscribe();
            tokio::spawn(async move { app.run_dispatch_loop(dispatch, shutdown_rx).await })
        };

        let releaser: Arc<dyn WorkerReleaser> = self.pool.clone();
        let timeout_handle = tokio::spawn(
            TimeoutSweeper::new(Arc::clone(&self.queue))
                .with_worker_releaser(releaser)
                .run(timeout, shutdown_rx.resubscribe()),
        );

        let cleanup_handle = tokio::spawn(
            RetentionCleaner::new(Arc::clone(&self.queue), self.config.queue.retention_hours)
                .run(cleanup, shutdown_rx.resubscribe()),
        );

        let failure_handler: Arc<dyn WorkerFailureHandler> = self.queue.clone();
        let health_handle = tokio::spawn(
            HealthMonitor::new(
                Arc::clone(&self.pool),
                failure_handler,
                self.config.pool.auto_restart_offline,
            )
            .run(health, shutdown_rx.resubscribe()),
        );

        let scaling_handle = tokio::spawn(
            ScalingController::new(
                Arc::clone(&self.pool),
                self.autoscaler.clone(),
                Arc::clone(&self.metrics_source),
                self.config.pool.default_worker_type.clone(),
            )
            .run(scaling, shutdown_rx),
        );

        let results = tokio::join!(
            dispatch_handle,
            timeout_handle,
            cleanup_handle,
            health_handle,
            scaling_handle
        );
        for (name, result) in [
            ("dispatch", results.0),
            ("timeout", results.1),
            ("cleanup", results.2),
            ("health", results.3),
            ("scaling", results.4),
        ] {
            if let Err(e) = result {
                error!("后台循环 {} 异常退出: {}", name, e);
            }
        }

        info!("控制平面后台循环已全部停止");
        Ok(())
    }

    async fn run_dispatch_loop(
        &self,
        mut ticker: Box<dyn Ticker>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("启动任务分发循环");
        loop {
            tokio::select! {
                alive = ticker.tick() => {
                    if !alive {
                        break;
                    }
                    self.dispatch_once().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("收到停止信号，退出任务分发循环");
                    break;
                }
            }
        }
    }
}
