use async_trait::async_trait;
use orchestrator_errors::OrchestratorResult;

use crate::events::OrchestratorEvent;
use crate::models::PoolMetrics;

/// 事件发布接口
///
/// 发布是即发即弃的：实现不得阻塞调用方，也不向调用方返回投递失败。
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: OrchestratorEvent);
}

/// 丢弃所有事件
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn publish(&self, _event: OrchestratorEvent) {}
}

/// Worker 供给接口，由外部进程或容器管理器实现
///
/// 池管理器只决定数量，不关心 Worker 如何启动。
#[async_trait]
pub trait WorkerProvisioner: Send + Sync {
    /// 启动一个指定类型的 Worker，返回其ID
    async fn spawn(&self, worker_type: &str) -> OrchestratorResult<String>;

    /// 终止 Worker
    async fn terminate(&self, worker_id: &str) -> OrchestratorResult<()>;
}

/// 池指标来源
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// 返回 `None` 表示当前没有可用的快照
    async fn sample(&self) -> Option<PoolMetrics>;
}

/// Worker 故障处理接口
#[async_trait]
pub trait WorkerFailureHandler: Send + Sync {
    /// 将分配给该 Worker 的任务重新走重试流程，返回处理的任务数
    async fn handle_worker_failure(&self, worker_id: &str) -> OrchestratorResult<usize>;
}

/// Worker 释放接口
///
/// 任务被超时扫描收回时，把持有它的 Worker 退回 IDLE。
#[async_trait]
pub trait WorkerReleaser: Send + Sync {
    /// Worker 不存在时返回 `Ok(false)`
    async fn release_worker(&self, worker_id: &str, success: bool) -> OrchestratorResult<bool>;
}
