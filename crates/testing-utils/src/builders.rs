//! Test data builders for creating domain values
//!
//! Builders start from sensible defaults so tests only spell out the
//! fields they care about.

use chrono::{DateTime, Utc};
use orchestrator_domain::models::{PoolMetrics, ScalingPolicy, Task, TaskPriority, Trend};
use std::sync::atomic::{AtomicUsize, Ordering};

static TASK_SEQ: AtomicUsize = AtomicUsize::new(1);

/// Builder for creating test Task values
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new() -> Self {
        let n = TASK_SEQ.fetch_add(1, Ordering::SeqCst);
        Self {
            task: Task::with_id(
                format!("task-{n}"),
                "test_task",
                TaskPriority::Normal,
                Utc::now(),
            ),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.task.id = id.to_string();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.task.name = name.to_string();
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.task.created_at = created_at;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.task.deadline = Some(deadline);
        self
    }

    pub fn with_estimated_duration(mut self, seconds: u64) -> Self {
        self.task.estimated_duration_seconds = Some(seconds);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.task.metadata.insert(key.to_string(), value);
        self
    }

    pub fn low(self) -> Self {
        self.with_priority(TaskPriority::Low)
    }

    pub fn high(self) -> Self {
        self.with_priority(TaskPriority::High)
    }

    pub fn critical(self) -> Self {
        self.with_priority(TaskPriority::Critical)
    }

    pub fn build(self) -> Task {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test PoolMetrics snapshots
pub struct PoolMetricsBuilder {
    metrics: PoolMetrics,
}

impl PoolMetricsBuilder {
    pub fn new() -> Self {
        Self {
            metrics: PoolMetrics {
                pool_size: 5,
                utilization_pct: 60.0,
                queue_depth: 0,
                queue_depth_trend: Trend::Stable,
                p50_latency_ms: 100.0,
                p95_latency_ms: 150.0,
                p99_latency_ms: 200.0,
                latency_trend: Trend::Stable,
                sampled_at: Utc::now(),
            },
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.metrics.pool_size = pool_size;
        self
    }

    pub fn with_utilization(mut self, utilization_pct: f64) -> Self {
        self.metrics.utilization_pct = utilization_pct;
        self
    }

    pub fn with_queue_depth(mut self, queue_depth: usize, trend: Trend) -> Self {
        self.metrics.queue_depth = queue_depth;
        self.metrics.queue_depth_trend = trend;
        self
    }

    pub fn with_latency(mut self, p50: f64, p95: f64, p99: f64, trend: Trend) -> Self {
        self.metrics.p50_latency_ms = p50;
        self.metrics.p95_latency_ms = p95;
        self.metrics.p99_latency_ms = p99;
        self.metrics.latency_trend = trend;
        self
    }

    pub fn sampled_at(mut self, sampled_at: DateTime<Utc>) -> Self {
        self.metrics.sampled_at = sampled_at;
        self
    }

    pub fn build(self) -> PoolMetrics {
        self.metrics
    }
}

impl Default for PoolMetricsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Policy used by the scaling scenarios: min 2, max 10, up 0.85, down 0.5, cooldown 60s
pub fn scenario_policy() -> ScalingPolicy {
    ScalingPolicy {
        min_pool_size: 2,
        max_pool_size: 10,
        scale_up_threshold: 0.85,
        scale_down_threshold: 0.5,
        ..ScalingPolicy::default()
    }
}
