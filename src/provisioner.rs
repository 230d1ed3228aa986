use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use orchestrator_domain::ports::WorkerProvisioner;
use orchestrator_errors::OrchestratorResult;

/// 只记录日志的 Worker 供给实现
///
/// 本地运行时使用；真实的进程或容器管理器通过同一个 trait 接入。
#[derive(Debug, Default)]
pub struct LoggingProvisioner;

impl LoggingProvisioner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WorkerProvisioner for LoggingProvisioner {
    async fn spawn(&self, worker_type: &str) -> OrchestratorResult<String> {
        let worker_id = format!("{worker_type}-{}", Uuid::new_v4());
        info!(
            event = "worker_spawn_requested",
            worker.id = worker_id.as_str(),
            worker.type = worker_type,
            "Worker spawn requested"
        );
        Ok(worker_id)
    }

    async fn terminate(&self, worker_id: &str) -> OrchestratorResult<()> {
        info!(
            event = "worker_terminate_requested",
            worker.id = worker_id,
            "Worker termination requested"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawned_ids_are_unique_and_typed() {
        let provisioner = LoggingProvisioner::new();
        let a = provisioner.spawn("lint").await.unwrap();
        let b = provisioner.spawn("lint").await.unwrap();
        assert!(a.starts_with("lint-"));
        assert_ne!(a, b);
        assert!(provisioner.terminate(&a).await.is_ok());
    }
}
