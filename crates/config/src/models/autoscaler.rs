use crate::validation::{ConfigValidator, ValidationUtils};
use crate::ConfigError;
use orchestrator_domain::ScalingPolicy;
use serde::{Deserialize, Serialize};

/// 自动扩缩容配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutoscalerConfig {
    pub enabled: bool,
    pub evaluation_interval_seconds: u64,
    /// 队列深度超过该值且持续增长时触发扩容
    pub queue_depth_threshold: usize,
    /// p95/p50 延迟比超过该值且持续增长时触发扩容
    pub latency_ratio_threshold: f64,
    pub history_limit: usize,
    pub policy: ScalingPolicy,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            evaluation_interval_seconds: 30,
            queue_depth_threshold: 10,
            latency_ratio_threshold: 2.5,
            history_limit: 100,
            policy: ScalingPolicy::default(),
        }
    }
}

impl ConfigValidator for AutoscalerConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_positive(
            self.evaluation_interval_seconds,
            "autoscaler.evaluation_interval_seconds",
        )?;
        if !self.latency_ratio_threshold.is_finite() || self.latency_ratio_threshold <= 1.0 {
            return Err(ConfigError::Validation(format!(
                "autoscaler.latency_ratio_threshold must be greater than 1, got {}",
                self.latency_ratio_threshold
            )));
        }
        ValidationUtils::validate_count(self.history_limit, "autoscaler.history_limit", 100_000)?;
        self.policy.validate()
    }
}

impl ConfigValidator for ScalingPolicy {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_count(
            self.max_pool_size,
            "autoscaler.policy.max_pool_size",
            10000,
        )?;
        ValidationUtils::validate_bounds(
            self.min_pool_size,
            self.max_pool_size,
            "autoscaler.policy.min_pool_size",
            "autoscaler.policy.max_pool_size",
        )?;
        ValidationUtils::validate_ratio(
            self.scale_up_threshold,
            "autoscaler.policy.scale_up_threshold",
        )?;
        ValidationUtils::validate_ratio(
            self.scale_down_threshold,
            "autoscaler.policy.scale_down_threshold",
        )?;
        ValidationUtils::validate_threshold_order(
            self.scale_down_threshold,
            self.scale_up_threshold,
            "autoscaler.policy.scale_down_threshold",
            "autoscaler.policy.scale_up_threshold",
        )?;
        ValidationUtils::validate_ratio(
            self.target_utilization,
            "autoscaler.policy.target_utilization",
        )?;
        ValidationUtils::validate_count(
            self.scale_up_increment,
            "autoscaler.policy.scale_up_increment",
            1000,
        )?;
        if self.scale_down_decrement == 0 {
            return Err(ConfigError::Validation(
                "autoscaler.policy.scale_down_decrement cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}
