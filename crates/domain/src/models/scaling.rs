use std::fmt;

use chrono::{DateTime, Utc};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use serde::{Deserialize, Serialize};

/// 指标变化趋势
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    #[default]
    Stable,
    Decreasing,
}

impl Trend {
    /// 比较两次采样得出趋势，变化幅度不超过 `tolerance` 视为平稳
    pub fn between(previous: f64, current: f64, tolerance: f64) -> Self {
        let delta = current - previous;
        if delta > tolerance {
            Trend::Increasing
        } else if delta < -tolerance {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    }
}

/// 池指标快照
///
/// 由外部指标源产生，自动扩缩容器只读使用。`utilization_pct` 取值 0–100，
/// 延迟单位为毫秒。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolMetrics {
    pub pool_size: usize,
    pub utilization_pct: f64,
    pub queue_depth: usize,
    pub queue_depth_trend: Trend,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub latency_trend: Trend,
    pub sampled_at: DateTime<Utc>,
}

impl PoolMetrics {
    /// 校验快照是否可用于决策
    pub fn validate(&self) -> OrchestratorResult<()> {
        let values = [
            ("utilization_pct", self.utilization_pct),
            ("p50_latency_ms", self.p50_latency_ms),
            ("p95_latency_ms", self.p95_latency_ms),
            ("p99_latency_ms", self.p99_latency_ms),
        ];
        for (name, value) in values {
            if !value.is_finite() || value < 0.0 {
                return Err(OrchestratorError::invalid_metrics(format!(
                    "{name} 必须是非负有限数值，实际为 {value}"
                )));
            }
        }
        if self.utilization_pct > 100.0 {
            return Err(OrchestratorError::invalid_metrics(format!(
                "utilization_pct 超出范围: {}",
                self.utilization_pct
            )));
        }
        Ok(())
    }

    /// p95/p50 延迟比，p50 为 0 时无意义
    pub fn latency_ratio(&self) -> Option<f64> {
        if self.p50_latency_ms > 0.0 {
            Some(self.p95_latency_ms / self.p50_latency_ms)
        } else {
            None
        }
    }
}

/// 扩缩容策略，构造后不可变
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScalingPolicy {
    pub min_pool_size: usize,
    pub max_pool_size: usize,
    /// 0–1 之间的比例，与 `utilization_pct / 100` 比较
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
    pub target_utilization: f64,
    pub scale_up_increment: usize,
    /// 缩容步长，取绝对值使用，正负号均可
    pub scale_down_decrement: i64,
    pub cooldown_seconds: u64,
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self {
            min_pool_size: 1,
            max_pool_size: 10,
            scale_up_threshold: 0.8,
            scale_down_threshold: 0.3,
            target_utilization: 0.7,
            scale_up_increment: 2,
            scale_down_decrement: -1,
            cooldown_seconds: 60,
        }
    }
}

impl ScalingPolicy {
    pub fn clamp(&self, size: usize) -> usize {
        size.clamp(self.min_pool_size, self.max_pool_size.max(self.min_pool_size))
    }

    pub fn scale_up_target(&self, current: usize) -> usize {
        self.clamp(current.saturating_add(self.scale_up_increment))
    }

    pub fn scale_down_target(&self, current: usize) -> usize {
        let step = usize::try_from(self.scale_down_decrement.unsigned_abs()).unwrap_or(usize::MAX);
        self.clamp(current.saturating_sub(step))
    }
}

/// 扩缩容方向
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScaleDirection {
    ScaleUp,
    ScaleDown,
    Maintain,
}

impl fmt::Display for ScaleDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScaleDirection::ScaleUp => "SCALE_UP",
            ScaleDirection::ScaleDown => "SCALE_DOWN",
            ScaleDirection::Maintain => "MAINTAIN",
        };
        f.write_str(s)
    }
}

/// 自动扩缩容器的决策结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingDecision {
    pub direction: ScaleDirection,
    pub current_size: usize,
    pub target_size: usize,
    pub reason: String,
    pub triggered_by: String,
    pub timestamp: DateTime<Utc>,
}

impl ScalingDecision {
    pub fn maintain(
        current_size: usize,
        reason: impl Into<String>,
        triggered_by: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            direction: ScaleDirection::Maintain,
            current_size,
            target_size: current_size,
            reason: reason.into(),
            triggered_by: triggered_by.into(),
            timestamp,
        }
    }

    /// 目标规模与当前规模之差的绝对值
    pub fn delta(&self) -> usize {
        self.target_size.abs_diff(self.current_size)
    }

    pub fn is_maintain(&self) -> bool {
        self.direction == ScaleDirection::Maintain
    }
}

/// 池管理器的机械扩缩容计算结果 `(action, count)`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScalingAction {
    pub direction: ScaleDirection,
    pub count: usize,
}

impl ScalingAction {
    pub fn none() -> Self {
        Self {
            direction: ScaleDirection::Maintain,
            count: 0,
        }
    }

    pub fn up(count: usize) -> Self {
        Self {
            direction: ScaleDirection::ScaleUp,
            count,
        }
    }

    pub fn down(count: usize) -> Self {
        Self {
            direction: ScaleDirection::ScaleDown,
            count,
        }
    }
}
