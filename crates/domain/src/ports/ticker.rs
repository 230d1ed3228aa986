use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// 周期任务的节拍源
///
/// 后台循环只通过该接口等待下一次执行，测试中可以用手动节拍替代真实时间。
#[async_trait]
pub trait Ticker: Send {
    /// 等待下一个节拍，返回 `false` 表示节拍源已关闭
    async fn tick(&mut self) -> bool;
}

/// 基于 `tokio::time::interval` 的节拍源
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    /// 首个节拍在一个周期之后触发
    pub fn new(period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // interval 的第一个节拍立即完成，这里消耗掉它
        interval.reset();
        Self { interval }
    }

    pub fn from_secs(seconds: u64) -> Self {
        Self::new(Duration::from_secs(seconds))
    }

    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}
