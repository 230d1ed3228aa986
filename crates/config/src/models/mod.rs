pub mod app_config;
pub mod autoscaler;
pub mod dispatch;
pub mod observability;
pub mod pool;
pub mod queue;
pub mod scheduler;

pub use app_config::*;
pub use autoscaler::*;
pub use dispatch::*;
pub use observability::*;
pub use pool::*;
pub use queue::*;
pub use scheduler::*;
