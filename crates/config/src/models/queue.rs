use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

/// 任务队列配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    pub default_timeout_seconds: u64,
    pub default_max_retries: u32,
    pub timeout_check_interval_seconds: u64,
    pub cleanup_interval_seconds: u64,
    /// 终态任务的保留时长
    pub retention_hours: u64,
    /// 执行耗时滑动窗口大小，用于计算延迟分位数
    pub latency_window_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_timeout_seconds: 3600,
            default_max_retries: 3,
            timeout_check_interval_seconds: 10,
            cleanup_interval_seconds: 600,
            retention_hours: 24,
            latency_window_size: 1000,
        }
    }
}

impl ConfigValidator for QueueConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_positive(
            self.default_timeout_seconds,
            "queue.default_timeout_seconds",
        )?;
        ValidationUtils::validate_positive(
            self.timeout_check_interval_seconds,
            "queue.timeout_check_interval_seconds",
        )?;
        ValidationUtils::validate_positive(
            self.cleanup_interval_seconds,
            "queue.cleanup_interval_seconds",
        )?;
        ValidationUtils::validate_positive(self.retention_hours, "queue.retention_hours")?;
        ValidationUtils::validate_count(
            self.latency_window_size,
            "queue.latency_window_size",
            1_000_000,
        )?;
        Ok(())
    }
}
