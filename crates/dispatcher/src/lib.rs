pub mod scheduler;
pub mod strategies;
pub mod task_queue;
pub mod timeout_sweeper;

pub use scheduler::{Scheduler, SchedulerMetrics};
pub use strategies::{
    strategy_for, AdaptiveStrategy, EdfStrategy, FifoStrategy, PendingTask, PriorityStrategy,
    SchedulingStrategy,
};
pub use task_queue::{
    LatencyPercentiles, QueueMetrics, TaskQueueConfig, TaskQueueManager, TimedOutTask,
};
pub use timeout_sweeper::{RetentionCleaner, TimeoutSweeper};
