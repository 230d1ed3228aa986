use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use orchestrator_dispatcher::TaskQueueManager;
use orchestrator_domain::models::{PoolMetrics, Trend, WorkerStatus};
use orchestrator_domain::ports::{Clock, MetricsSource};
use orchestrator_observability::MetricsCollector;
use orchestrator_pool::WorkerPoolManager;

/// p95 变化小于上次采样的该比例时视为平稳
const LATENCY_TREND_TOLERANCE: f64 = 0.05;

const ALL_STATUSES: [WorkerStatus; 6] = [
    WorkerStatus::Starting,
    WorkerStatus::Idle,
    WorkerStatus::Working,
    WorkerStatus::Offline,
    WorkerStatus::Error,
    WorkerStatus::Stopping,
];

#[derive(Debug, Clone, Copy)]
struct PreviousSample {
    queue_depth: usize,
    p95_latency_ms: f64,
}

/// 从队列管理器和池管理器采样 [`PoolMetrics`]
///
/// 趋势通过与上一次采样比较得出，第一次采样的趋势为平稳。采样的同时刷新
/// 队列深度与池规模等 gauge。
pub struct PoolMetricsSampler {
    queue: Arc<TaskQueueManager>,
    pool: Arc<WorkerPoolManager>,
    clock: Arc<dyn Clock>,
    metrics: Arc<MetricsCollector>,
    previous: Mutex<Option<PreviousSample>>,
}

impl PoolMetricsSampler {
    pub fn new(
        queue: Arc<TaskQueueManager>,
        pool: Arc<WorkerPoolManager>,
        clock: Arc<dyn Clock>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            queue,
            pool,
            clock,
            metrics,
            previous: Mutex::new(None),
        }
    }
}

#[async_trait]
impl MetricsSource for PoolMetricsSampler {
    async fn sample(&self) -> Option<PoolMetrics> {
        let queue_metrics = self.queue.get_metrics().await;
        let pool_metrics = self.pool.get_metrics().await;

        for (tier, depth) in &queue_metrics.depth_by_tier {
            self.metrics.set_queue_depth(*tier, *depth);
        }
        self.metrics.set_pool_size(pool_metrics.pool_size);
        for status in ALL_STATUSES {
            let count = pool_metrics
                .status_distribution
                .get(status.as_str())
                .copied()
                .unwrap_or(0);
            self.metrics.set_workers_by_status(status, count);
        }

        let latency = &queue_metrics.latency;
        let mut previous = self.previous.lock().await;
        let (queue_depth_trend, latency_trend) = match *previous {
            Some(prev) => (
                Trend::between(prev.queue_depth as f64, queue_metrics.queued as f64, 0.0),
                Trend::between(
                    prev.p95_latency_ms,
                    latency.p95_ms,
                    prev.p95_latency_ms * LATENCY_TREND_TOLERANCE,
                ),
            ),
            None => (Trend::Stable, Trend::Stable),
        };
        *previous = Some(PreviousSample {
            queue_depth: queue_metrics.queued,
            p95_latency_ms: latency.p95_ms,
        });

        let sample = PoolMetrics {
            pool_size: pool_metrics.pool_size,
            utilization_pct: pool_metrics.utilization * 100.0,
            queue_depth: queue_metrics.queued,
            queue_depth_trend,
            p50_latency_ms: latency.p50_ms,
            p95_latency_ms: latency.p95_ms,
            p99_latency_ms: latency.p99_ms,
            latency_trend,
            sampled_at: self.clock.now(),
        };
        debug!(
            "池指标采样: 规模 {}，利用率 {:.1}%，排队 {}",
            sample.pool_size, sample.utilization_pct, sample.queue_depth
        );
        Some(sample)
    }
}
