use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use orchestrator_domain::ports::{Ticker, WorkerReleaser};

use crate::task_queue::TaskQueueManager;

/// 周期性超时扫描
///
/// 配置了 [`WorkerReleaser`] 时，被收回任务的原 Worker 同时退回 IDLE。
pub struct TimeoutSweeper {
    queue: Arc<TaskQueueManager>,
    workers: Option<Arc<dyn WorkerReleaser>>,
}

impl TimeoutSweeper {
    pub fn new(queue: Arc<TaskQueueManager>) -> Self {
        Self {
            queue,
            workers: None,
        }
    }

    pub fn with_worker_releaser(mut self, workers: Arc<dyn WorkerReleaser>) -> Self {
        self.workers = Some(workers);
        self
    }

    /// 执行一次扫描，返回超时的任务ID
    pub async fn sweep_once(&self) -> Vec<String> {
        let timed_out = match self.queue.check_timeouts().await {
            Ok(timed_out) => timed_out,
            Err(e) => {
                error!("超时扫描时出错: {}", e);
                return Vec::new();
            }
        };

        if let Some(workers) = &self.workers {
            for worker_id in timed_out.iter().filter_map(|t| t.worker_id.as_deref()) {
                match workers.release_worker(worker_id, false).await {
                    Ok(true) => debug!("超时任务的 Worker {} 已退回空闲", worker_id),
                    Ok(false) => debug!("超时任务的 Worker {} 已不在池中", worker_id),
                    Err(e) => warn!("释放 Worker {} 失败: {}", worker_id, e),
                }
            }
        }

        timed_out.into_iter().map(|t| t.task_id).collect()
    }

    /// 按节拍循环扫描，直到收到停止信号或节拍源关闭
    pub async fn run(self, mut ticker: Box<dyn Ticker>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("启动任务超时扫描循环");
        loop {
            tokio::select! {
                alive = ticker.tick() => {
                    if !alive {
                        break;
                    }
                    let timed_out = self.sweep_once().await;
                    if !timed_out.is_empty() {
                        debug!("本轮超时任务: {:?}", timed_out);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("收到停止信号，退出任务超时扫描循环");
                    break;
                }
            }
        }
    }
}

/// 周期性清理过期终态任务
pub struct RetentionCleaner {
    queue: Arc<TaskQueueManager>,
    retention_hours: u64,
}

impl RetentionCleaner {
    pub fn new(queue: Arc<TaskQueueManager>, retention_hours: u64) -> Self {
        Self {
            queue,
            retention_hours,
        }
    }

    pub async fn run(self, mut ticker: Box<dyn Ticker>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("启动终态任务清理循环，保留 {} 小时", self.retention_hours);
        loop {
            tokio::select! {
                alive = ticker.tick() => {
                    if !alive {
                        break;
                    }
                    self.queue.cleanup_old_tasks(self.retention_hours).await;
                }
                _ = shutdown_rx.recv() => {
                    info!("收到停止信号，退出终态任务清理循环");
                    break;
                }
            }
        }
    }
}
