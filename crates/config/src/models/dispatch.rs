use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

/// 分发循环配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    pub interval_millis: u64,
    pub max_assignments_per_tick: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            interval_millis: 500,
            max_assignments_per_tick: 32,
        }
    }
}

impl ConfigValidator for DispatchConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_positive(self.interval_millis, "dispatch.interval_millis")?;
        ValidationUtils::validate_count(
            self.max_assignments_per_tick,
            "dispatch.max_assignments_per_tick",
            10000,
        )?;
        Ok(())
    }
}
