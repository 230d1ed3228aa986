use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use orchestrator_domain::events::{OrchestratorEvent, ScalingEvent};
use orchestrator_domain::models::{
    PoolMetrics, ScaleDirection, ScalingDecision, ScalingPolicy, Trend,
};
use orchestrator_domain::ports::{Clock, EventSink};
use orchestrator_errors::OrchestratorError;

/// 扩缩容触发条件的附加参数
#[derive(Debug, Clone)]
pub struct AutoscalerSettings {
    /// 队列深度超过该值且持续增长时扩容
    pub queue_depth_threshold: usize,
    /// p95/p50 延迟比超过该值且持续增长时扩容
    pub latency_ratio_threshold: f64,
    /// 决策历史保留条数
    pub history_limit: usize,
}

impl Default for AutoscalerSettings {
    fn default() -> Self {
        Self {
            queue_depth_threshold: 10,
            latency_ratio_threshold: 2.5,
            history_limit: 100,
        }
    }
}

/// 自动扩缩容统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoscalerMetrics {
    pub total_evaluations: u64,
    pub scale_up_decisions: u64,
    pub scale_down_decisions: u64,
    pub maintain_decisions: u64,
    pub cooldown_suppressions: u64,
    pub last_scaling_time: Option<DateTime<Utc>>,
    pub history_len: usize,
    pub policy: ScalingPolicy,
}

#[derive(Default)]
struct AutoscalerState {
    history: VecDeque<ScalingDecision>,
    last_decision_time: Option<DateTime<Utc>>,
    total_evaluations: u64,
    scale_up_decisions: u64,
    scale_down_decisions: u64,
    maintain_decisions: u64,
    cooldown_suppressions: u64,
}

/// 自动扩缩容器
///
/// 把池指标快照转换为单个 [`ScalingDecision`]。上一次改变规模的决策之后
/// `cooldown_seconds` 内只会返回 MAINTAIN，避免池规模来回抖动。
/// 指标缺失或异常时一律返回 MAINTAIN。
pub struct Autoscaler {
    policy: ScalingPolicy,
    settings: AutoscalerSettings,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    state: Mutex<AutoscalerState>,
}

impl Autoscaler {
    pub fn new(
        policy: ScalingPolicy,
        settings: AutoscalerSettings,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            policy,
            settings,
            clock,
            events,
            state: Mutex::new(AutoscalerState::default()),
        }
    }

    pub fn policy(&self) -> &ScalingPolicy {
        &self.policy
    }

    pub async fn evaluate_scaling(
        &self,
        metrics: &PoolMetrics,
        current_pool_size: usize,
    ) -> ScalingDecision {
        let now = self.clock.now();
        let decision = {
            let mut state = self.state.lock().await;
            let decision = match self.cooldown_remaining(&state, now) {
                Some(remaining) => {
                    state.cooldown_suppressions += 1;
                    debug!(
                        "{}",
                        OrchestratorError::ScalingSuppressed(format!("冷却中，剩余 {remaining} 秒"))
                    );
                    self.hold(
                        current_pool_size,
                        format!(
                            "cooldown active: {remaining}s remaining of {}s",
                            self.policy.cooldown_seconds
                        ),
                        "cooldown",
                        now,
                    )
                }
                None => self.decide(metrics, current_pool_size, now),
            };
            self.record(&mut state, decision.clone(), now);
            decision
        };

        self.publish(decision.clone(), now).await;
        decision
    }

    /// 指标源无数据时记录一条 MAINTAIN 决策
    pub async fn evaluate_missing_metrics(&self, current_pool_size: usize) -> ScalingDecision {
        let now = self.clock.now();
        let decision = self.hold(
            current_pool_size,
            "metrics unavailable, holding pool size",
            "metrics_unavailable",
            now,
        );
        warn!("指标源无数据，保持池规模 {}", current_pool_size);
        {
            let mut state = self.state.lock().await;
            self.record(&mut state, decision.clone(), now);
        }
        self.publish(decision.clone(), now).await;
        decision
    }

    fn cooldown_remaining(&self, state: &AutoscalerState, now: DateTime<Utc>) -> Option<i64> {
        let last = state.last_decision_time?;
        let cooldown = i64::try_from(self.policy.cooldown_seconds).unwrap_or(i64::MAX);
        let elapsed = (now - last).num_seconds();
        (elapsed < cooldown).then(|| cooldown - elapsed)
    }

    /// 冷却检查之后的决策逻辑
    fn decide(&self, metrics: &PoolMetrics, current: usize, now: DateTime<Utc>) -> ScalingDecision {
        if let Err(e) = metrics.validate() {
            warn!("忽略异常的池指标: {}", e);
            return self.hold(
                current,
                format!("invalid metrics: {e}"),
                "metrics_invalid",
                now,
            );
        }

        let policy = &self.policy;
        let bounded = policy.clamp(current);
        if bounded != current {
            return self.resize(
                current,
                bounded,
                format!(
                    "pool size {current} outside bounds [{}, {}]",
                    policy.min_pool_size, policy.max_pool_size
                ),
                "pool_bounds",
                now,
            );
        }

        let utilization = metrics.utilization_pct;
        if utilization > policy.scale_up_threshold * 100.0 {
            return self.resize(
                current,
                policy.scale_up_target(current),
                format!(
                    "utilization {utilization:.1}% above {:.1}%",
                    policy.scale_up_threshold * 100.0
                ),
                "utilization",
                now,
            );
        }

        if metrics.queue_depth > self.settings.queue_depth_threshold
            && metrics.queue_depth_trend == Trend::Increasing
        {
            return self.resize(
                current,
                policy.scale_up_target(current),
                format!(
                    "queue depth {} above {} and increasing",
                    metrics.queue_depth, self.settings.queue_depth_threshold
                ),
                "queue_depth",
                now,
            );
        }

        if let Some(ratio) = metrics.latency_ratio() {
            if ratio > self.settings.latency_ratio_threshold
                && metrics.latency_trend == Trend::Increasing
            {
                return self.resize(
                    current,
                    policy.scale_up_target(current),
                    format!(
                        "p95/p50 latency ratio {ratio:.2} above {:.2} and increasing",
                        self.settings.latency_ratio_threshold
                    ),
                    "latency",
                    now,
                );
            }
        }

        if utilization < policy.scale_down_threshold * 100.0 {
            return self.resize(
                current,
                policy.scale_down_target(current),
                format!(
                    "utilization {utilization:.1}% below {:.1}%",
                    policy.scale_down_threshold * 100.0
                ),
                "utilization",
                now,
            );
        }

        self.hold(current, "metrics within thresholds", "none", now)
    }

    /// MAINTAIN 决策，目标规模仍然截断到策略边界内
    fn hold(
        &self,
        current: usize,
        reason: impl Into<String>,
        triggered_by: &str,
        now: DateTime<Utc>,
    ) -> ScalingDecision {
        ScalingDecision {
            target_size: self.policy.clamp(current),
            ..ScalingDecision::maintain(current, reason, triggered_by, now)
        }
    }

    /// 目标规模等于当前规模时退化为 MAINTAIN
    fn resize(
        &self,
        current: usize,
        target: usize,
        reason: String,
        triggered_by: &str,
        now: DateTime<Utc>,
    ) -> ScalingDecision {
        let direction = match target.cmp(&current) {
            std::cmp::Ordering::Greater => ScaleDirection::ScaleUp,
            std::cmp::Ordering::Less => ScaleDirection::ScaleDown,
            std::cmp::Ordering::Equal => {
                return ScalingDecision::maintain(
                    current,
                    format!("{reason}, pool already at bound"),
                    triggered_by,
                    now,
                );
            }
        };
        ScalingDecision {
            direction,
            current_size: current,
            target_size: target,
            reason,
            triggered_by: triggered_by.to_string(),
            timestamp: now,
        }
    }

    fn record(&self, state: &mut AutoscalerState, decision: ScalingDecision, now: DateTime<Utc>) {
        state.total_evaluations += 1;
        match decision.direction {
            ScaleDirection::ScaleUp => state.scale_up_decisions += 1,
            ScaleDirection::ScaleDown => state.scale_down_decisions += 1,
            ScaleDirection::Maintain => state.maintain_decisions += 1,
        }
        if !decision.is_maintain() && decision.target_size != decision.current_size {
            state.last_decision_time = Some(now);
            info!(
                "扩缩容决策: {} {} -> {} ({})",
                decision.direction, decision.current_size, decision.target_size, decision.reason
            );
        } else {
            debug!("保持池规模 {}: {}", decision.current_size, decision.reason);
        }

        state.history.push_back(decision);
        while state.history.len() > self.settings.history_limit.max(1) {
            state.history.pop_front();
        }
    }

    async fn publish(&self, decision: ScalingDecision, now: DateTime<Utc>) {
        self.events
            .publish(OrchestratorEvent::scaling(
                ScalingEvent::DecisionMade { decision },
                now,
            ))
            .await;
    }

    /// 最近的 `limit` 条决策，按时间先后排列
    pub async fn get_scaling_history(&self, limit: usize) -> Vec<ScalingDecision> {
        let state = self.state.lock().await;
        let skip = state.history.len().saturating_sub(limit);
        state.history.iter().skip(skip).cloned().collect()
    }

    pub async fn get_scaling_metrics(&self) -> AutoscalerMetrics {
        let state = self.state.lock().await;
        AutoscalerMetrics {
            total_evaluations: state.total_evaluations,
            scale_up_decisions: state.scale_up_decisions,
            scale_down_decisions: state.scale_down_decisions,
            maintain_decisions: state.maintain_decisions,
            cooldown_suppressions: state.cooldown_suppressions,
            last_scaling_time: state.last_decision_time,
            history_len: state.history.len(),
            policy: self.policy.clone(),
        }
    }
}
