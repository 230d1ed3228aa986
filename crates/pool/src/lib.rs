pub mod autoscaler;
pub mod health_monitor;
pub mod pool_manager;
pub mod scaling_controller;

pub use autoscaler::{Autoscaler, AutoscalerMetrics, AutoscalerSettings};
pub use health_monitor::{HealthMonitor, HealthReport};
pub use pool_manager::{PoolManagerConfig, PoolManagerMetrics, WorkerPoolManager};
pub use scaling_controller::{ScalingController, ScalingOutcome};
