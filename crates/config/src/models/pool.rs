use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

/// Worker池配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    /// 每个活跃 Worker 期望承载的排队任务数
    pub target_queue_per_worker: usize,
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
    /// 心跳存活窗口
    pub heartbeat_timeout_seconds: u64,
    pub health_check_interval_seconds: u64,
    pub max_restarts: u32,
    pub default_worker_type: String,
    /// 健康检查发现离线 Worker 后是否自动重启
    pub auto_restart_offline: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 1,
            max_workers: 10,
            target_queue_per_worker: 5,
            scale_up_threshold: 0.8,
            scale_down_threshold: 0.3,
            heartbeat_timeout_seconds: 30,
            health_check_interval_seconds: 10,
            max_restarts: 3,
            default_worker_type: "default".to_string(),
            auto_restart_offline: false,
        }
    }
}

impl ConfigValidator for PoolConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_count(self.max_workers, "pool.max_workers", 10000)?;
        ValidationUtils::validate_bounds(
            self.min_workers,
            self.max_workers,
            "pool.min_workers",
            "pool.max_workers",
        )?;
        ValidationUtils::validate_count(
            self.target_queue_per_worker,
            "pool.target_queue_per_worker",
            100_000,
        )?;
        ValidationUtils::validate_ratio(self.scale_up_threshold, "pool.scale_up_threshold")?;
        ValidationUtils::validate_ratio(self.scale_down_threshold, "pool.scale_down_threshold")?;
        ValidationUtils::validate_threshold_order(
            self.scale_down_threshold,
            self.scale_up_threshold,
            "pool.scale_down_threshold",
            "pool.scale_up_threshold",
        )?;
        ValidationUtils::validate_positive(
            self.heartbeat_timeout_seconds,
            "pool.heartbeat_timeout_seconds",
        )?;
        ValidationUtils::validate_positive(
            self.health_check_interval_seconds,
            "pool.health_check_interval_seconds",
        )?;
        ValidationUtils::validate_not_empty(&self.default_worker_type, "pool.default_worker_type")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_validation() {
        assert!(PoolConfig::default().validate().is_ok());

        let inverted_bounds = PoolConfig {
            min_workers: 5,
            max_workers: 2,
            ..PoolConfig::default()
        };
        assert!(inverted_bounds.validate().is_err());

        let inverted_thresholds = PoolConfig {
            scale_up_threshold: 0.3,
            scale_down_threshold: 0.8,
            ..PoolConfig::default()
        };
        assert!(inverted_thresholds.validate().is_err());

        let empty_type = PoolConfig {
            default_worker_type: " ".to_string(),
            ..PoolConfig::default()
        };
        assert!(empty_type.validate().is_err());
    }
}
