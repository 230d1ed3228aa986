use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("任务重复提交: {id}")]
    DuplicateTask { id: String },
    #[error("容量耗尽: {0}")]
    CapacityExhausted(String),
    #[error("任务执行超时: {id} (超时 {timeout_seconds} 秒)")]
    TimeoutExceeded { id: String, timeout_seconds: u64 },
    #[error("任务重试次数耗尽: {id} (最大重试 {max_retries} 次)")]
    RetryExhausted { id: String, max_retries: u32 },
    #[error("Worker重启次数达到上限: {id} (最大重启 {max_restarts} 次)")]
    RestartLimitReached { id: String, max_restarts: u32 },
    #[error("扩缩容被抑制: {0}")]
    ScalingSuppressed(String),
    #[error("非法状态转换: {entity} {id} 从 {from} 到 {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },
    #[error("无效的指标数据: {0}")]
    InvalidMetrics(String),
    #[error("Worker供给错误: {0}")]
    Provisioning(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl OrchestratorError {
    pub fn invalid_transition<S, F, T>(entity: &'static str, id: S, from: F, to: T) -> Self
    where
        S: Into<String>,
        F: std::fmt::Debug,
        T: std::fmt::Debug,
    {
        Self::InvalidTransition {
            entity,
            id: id.into(),
            from: format!("{from:?}"),
            to: format!("{to:?}"),
        }
    }
    pub fn provisioning<S: Into<String>>(msg: S) -> Self {
        Self::Provisioning(msg.into())
    }
    pub fn invalid_metrics<S: Into<String>>(msg: S) -> Self {
        Self::InvalidMetrics(msg.into())
    }

    /// 需要外部介入才能恢复的错误
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OrchestratorError::RestartLimitReached { .. }
                | OrchestratorError::RetryExhausted { .. }
                | OrchestratorError::Internal(_)
        )
    }

    /// 调用方稍后重试即可恢复的错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::CapacityExhausted(_)
                | OrchestratorError::TimeoutExceeded { .. }
                | OrchestratorError::Provisioning(_)
        )
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Internal(err.to_string())
    }
}
