use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 调度策略类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedulingStrategyKind {
    Fifo,
    #[default]
    Priority,
    /// 最早截止时间优先
    Edf,
    /// 按池负载在 PRIORITY 与 FIFO 之间切换
    Adaptive,
}

impl SchedulingStrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SchedulingStrategyKind::Fifo => "fifo",
            SchedulingStrategyKind::Priority => "priority",
            SchedulingStrategyKind::Edf => "edf",
            SchedulingStrategyKind::Adaptive => "adaptive",
        }
    }
}

impl FromStr for SchedulingStrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fifo" => Ok(SchedulingStrategyKind::Fifo),
            "priority" => Ok(SchedulingStrategyKind::Priority),
            "edf" => Ok(SchedulingStrategyKind::Edf),
            "adaptive" => Ok(SchedulingStrategyKind::Adaptive),
            _ => Err(format!(
                "Invalid scheduling strategy: {s}. Valid strategies: fifo, priority, edf, adaptive"
            )),
        }
    }
}

impl fmt::Display for SchedulingStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
