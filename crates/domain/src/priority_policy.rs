//! 优先级调整策略
//!
//! 调度器的饥饿保护（按等待时长提升）与队列管理器的重试升级（失败后提升一层）
//! 共用同一套阶梯规则，两处调用都经过 [`PriorityAdjustmentPolicy`]。

use chrono::Duration;

/// 可逐级提升的优先级阶梯
pub trait PriorityLadder: Copy + Ord {
    /// 阶梯顶端，提升到此为止
    const TOP: Self;

    fn rank(self) -> u8;

    /// 超出顶端的等级被截断为 `TOP`
    fn from_rank(rank: u8) -> Self;

    fn raised(self, levels: u32) -> Self {
        let levels = u8::try_from(levels).unwrap_or(u8::MAX);
        Self::from_rank(self.rank().saturating_add(levels))
    }

    fn is_top(self) -> bool {
        self == Self::TOP
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityAdjustmentPolicy {
    starvation_threshold: Duration,
}

impl PriorityAdjustmentPolicy {
    pub fn new(starvation_threshold_seconds: u64) -> Self {
        let seconds = i64::try_from(starvation_threshold_seconds).unwrap_or(i64::MAX);
        Self {
            starvation_threshold: Duration::try_seconds(seconds.max(1)).unwrap_or(Duration::MAX),
        }
    }

    pub fn starvation_threshold(&self) -> Duration {
        self.starvation_threshold
    }

    /// 等待超过阈值的层数，每多一个完整阈值多提升一级
    pub fn boost_levels(&self, age: Duration) -> u32 {
        if age <= self.starvation_threshold {
            return 0;
        }
        let levels = age.num_milliseconds() / self.starvation_threshold.num_milliseconds();
        u32::try_from(levels.max(1)).unwrap_or(u32::MAX)
    }

    /// 按等待时长计算有效优先级
    ///
    /// 总是从提交时的原始优先级重新计算，重复调用结果不变且不会降级。
    pub fn aged<P: PriorityLadder>(&self, original: P, age: Duration) -> P {
        original.raised(self.boost_levels(age))
    }

    /// 重试升级：提升一级，顶端保持不变
    pub fn escalated<P: PriorityLadder>(&self, current: P) -> P {
        current.raised(1)
    }
}

impl Default for PriorityAdjustmentPolicy {
    fn default() -> Self {
        Self::new(300)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QueueTier, TaskPriority};

    #[test]
    fn test_no_boost_within_threshold() {
        let policy = PriorityAdjustmentPolicy::new(60);
        assert_eq!(policy.boost_levels(Duration::seconds(30)), 0);
        assert_eq!(policy.boost_levels(Duration::seconds(60)), 0);
        assert_eq!(
            policy.aged(TaskPriority::Low, Duration::seconds(60)),
            TaskPriority::Low
        );
    }

    #[test]
    fn test_single_level_boost() {
        let policy = PriorityAdjustmentPolicy::new(60);
        assert_eq!(
            policy.aged(TaskPriority::Low, Duration::seconds(61)),
            TaskPriority::Normal
        );
        assert_eq!(
            policy.aged(TaskPriority::Normal, Duration::seconds(90)),
            TaskPriority::High
        );
    }

    #[test]
    fn test_multi_level_boost_is_capped() {
        let policy = PriorityAdjustmentPolicy::new(60);
        assert_eq!(
            policy.aged(TaskPriority::Low, Duration::seconds(150)),
            TaskPriority::High
        );
        assert_eq!(
            policy.aged(TaskPriority::Low, Duration::hours(5)),
            TaskPriority::Critical
        );
    }

    #[test]
    fn test_oversized_threshold_saturates() {
        let policy = PriorityAdjustmentPolicy::new(10_000_000_000_000_000);
        assert_eq!(policy.starvation_threshold(), Duration::MAX);
        assert_eq!(policy.boost_levels(Duration::days(3650)), 0);

        let policy = PriorityAdjustmentPolicy::new(u64::MAX);
        assert_eq!(
            policy.aged(TaskPriority::Low, Duration::days(3650)),
            TaskPriority::Low
        );
    }

    #[test]
    fn test_escalation_shared_by_tiers() {
        let policy = PriorityAdjustmentPolicy::default();
        assert_eq!(policy.escalated(QueueTier::Low), QueueTier::Normal);
        assert_eq!(policy.escalated(QueueTier::Normal), QueueTier::High);
        assert_eq!(policy.escalated(QueueTier::High), QueueTier::High);
        assert_eq!(policy.escalated(TaskPriority::High), TaskPriority::Critical);
        assert!(TaskPriority::Critical.is_top());
    }
}
