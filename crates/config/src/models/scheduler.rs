use crate::validation::{ConfigValidator, ValidationUtils};
use orchestrator_domain::SchedulingStrategyKind;
use serde::{Deserialize, Serialize};

/// 调度器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub strategy: SchedulingStrategyKind,
    /// 等待超过该时长的任务提升一级优先级
    pub starvation_threshold_seconds: u64,
    /// 池利用率高于该值时 ADAPTIVE 策略进入过载保护
    pub adaptive_high_load_threshold: f64,
    /// 池利用率低于该值时 ADAPTIVE 策略按优先级调度
    pub adaptive_low_load_threshold: f64,
    /// 每个分发周期从调度器移入队列的最大任务数
    pub admission_batch_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            strategy: SchedulingStrategyKind::Priority,
            starvation_threshold_seconds: 300,
            adaptive_high_load_threshold: 0.8,
            adaptive_low_load_threshold: 0.5,
            admission_batch_size: 32,
        }
    }
}

impl ConfigValidator for SchedulerConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_positive(
            self.starvation_threshold_seconds,
            "scheduler.starvation_threshold_seconds",
        )?;
        ValidationUtils::validate_ratio(
            self.adaptive_high_load_threshold,
            "scheduler.adaptive_high_load_threshold",
        )?;
        ValidationUtils::validate_ratio(
            self.adaptive_low_load_threshold,
            "scheduler.adaptive_low_load_threshold",
        )?;
        ValidationUtils::validate_threshold_order(
            self.adaptive_low_load_threshold,
            self.adaptive_high_load_threshold,
            "scheduler.adaptive_low_load_threshold",
            "scheduler.adaptive_high_load_threshold",
        )?;
        ValidationUtils::validate_count(
            self.admission_batch_size,
            "scheduler.admission_batch_size",
            10000,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_config_validation() {
        assert!(SchedulerConfig::default().validate().is_ok());

        let inverted = SchedulerConfig {
            adaptive_high_load_threshold: 0.4,
            adaptive_low_load_threshold: 0.5,
            ..SchedulerConfig::default()
        };
        assert!(inverted.validate().is_err());

        let no_threshold = SchedulerConfig {
            starvation_threshold_seconds: 0,
            ..SchedulerConfig::default()
        };
        assert!(no_threshold.validate().is_err());
    }
}
