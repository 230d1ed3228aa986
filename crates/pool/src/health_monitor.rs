use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use orchestrator_domain::ports::{Ticker, WorkerFailureHandler};

use crate::pool_manager::WorkerPoolManager;

/// Worker健康检查结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub offline: Vec<String>,
    pub requeued_tasks: usize,
    pub restarted: Vec<String>,
}

/// Worker健康监控
///
/// 每个节拍执行一次心跳检查；新离线的 Worker 名下任务交给
/// [`WorkerFailureHandler`] 重新排队，可选地尝试重启。
pub struct HealthMonitor {
    pool: Arc<WorkerPoolManager>,
    failure_handler: Arc<dyn WorkerFailureHandler>,
    auto_restart: bool,
}

impl HealthMonitor {
    pub fn new(
        pool: Arc<WorkerPoolManager>,
        failure_handler: Arc<dyn WorkerFailureHandler>,
        auto_restart: bool,
    ) -> Self {
        Self {
            pool,
            failure_handler,
            auto_restart,
        }
    }

    pub async fn check_once(&self) -> HealthReport {
        let mut report = HealthReport {
            offline: self.pool.check_worker_health().await,
            ..HealthReport::default()
        };

        for worker_id in &report.offline {
            match self.failure_handler.handle_worker_failure(worker_id).await {
                Ok(count) => report.requeued_tasks += count,
                Err(e) => error!("处理失效Worker {} 的任务时出错: {}", worker_id, e),
            }

            if self.auto_restart {
                match self.pool.restart_worker(worker_id).await {
                    Ok(true) => report.restarted.push(worker_id.clone()),
                    Ok(false) => warn!("Worker {} 未能重启", worker_id),
                    Err(e) if e.is_fatal() => {
                        error!("重启Worker {} 失败，需要人工介入: {}", worker_id, e)
                    }
                    Err(e) => warn!("重启Worker {} 时出错: {}", worker_id, e),
                }
            }
        }

        if !report.offline.is_empty() {
            info!(
                "检测到 {} 个失效的Worker，{} 个任务重新排队",
                report.offline.len(),
                report.requeued_tasks
            );
        }
        report
    }

    pub async fn run(self, mut ticker: Box<dyn Ticker>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("启动Worker健康检查循环");
        loop {
            tokio::select! {
                alive = ticker.tick() => {
                    if !alive {
                        break;
                    }
                    self.check_once().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("收到停止信号，退出Worker健康检查循环");
                    break;
                }
            }
        }
    }
}
