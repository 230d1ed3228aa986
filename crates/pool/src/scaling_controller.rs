use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use orchestrator_domain::models::{ScaleDirection, ScalingAction, ScalingDecision};
use orchestrator_domain::ports::{MetricsSource, Ticker};

use crate::autoscaler::Autoscaler;
use crate::pool_manager::WorkerPoolManager;

/// 一轮扩缩容评估的结果
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingOutcome {
    /// 自动扩缩容关闭时为 `None`
    pub decision: Option<ScalingDecision>,
    pub action: ScalingAction,
    pub requested: usize,
}

/// 扩缩容控制器
///
/// 周期性采样指标并把决策落实到池管理器。配置了 [`Autoscaler`] 时按其策略决策，
/// 否则退回池管理器基于队列深度的计算。
pub struct ScalingController {
    pool: Arc<WorkerPoolManager>,
    autoscaler: Option<Arc<Autoscaler>>,
    metrics: Arc<dyn MetricsSource>,
    worker_type: String,
}

impl ScalingController {
    pub fn new(
        pool: Arc<WorkerPoolManager>,
        autoscaler: Option<Arc<Autoscaler>>,
        metrics: Arc<dyn MetricsSource>,
        worker_type: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            autoscaler,
            metrics,
            worker_type: worker_type.into(),
        }
    }

    pub async fn evaluate_once(&self) -> ScalingOutcome {
        let sample = self.metrics.sample().await;
        let current = self.pool.pool_size().await;

        let (decision, action) = match &self.autoscaler {
            Some(autoscaler) => {
                let decision = match &sample {
                    Some(metrics) => autoscaler.evaluate_scaling(metrics, current).await,
                    None => autoscaler.evaluate_missing_metrics(current).await,
                };
                let action = match decision.direction {
                    ScaleDirection::ScaleUp => ScalingAction::up(decision.delta()),
                    ScaleDirection::ScaleDown => ScalingAction::down(decision.delta()),
                    ScaleDirection::Maintain => ScalingAction::none(),
                };
                (Some(decision), action)
            }
            None => {
                let action = match &sample {
                    Some(metrics) => self.pool.calculate_scaling_decision(metrics.queue_depth).await,
                    None => ScalingAction::none(),
                };
                (None, action)
            }
        };

        let requested = if action.count > 0 {
            self.pool
                .apply_scaling_decision(action.direction, action.count, &self.worker_type)
                .await
        } else {
            0
        };
        if requested > 0 {
            info!("执行扩缩容 {} x{}", action.direction, requested);
        } else {
            debug!("本轮无需扩缩容");
        }

        ScalingOutcome {
            decision,
            action,
            requested,
        }
    }

    pub async fn run(self, mut ticker: Box<dyn Ticker>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "启动扩缩容控制循环，自动扩缩容: {}",
            if self.autoscaler.is_some() { "开启" } else { "关闭" }
        );
        loop {
            tokio::select! {
                alive = ticker.tick() => {
                    if !alive {
                        break;
                    }
                    self.evaluate_once().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("收到停止信号，退出扩缩容控制循环");
                    break;
                }
            }
        }
    }
}
