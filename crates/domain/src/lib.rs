pub mod events;
pub mod models;
pub mod ports;
pub mod priority_policy;

pub use events::*;
pub use models::*;
pub use orchestrator_errors::{OrchestratorError, OrchestratorResult};
pub use ports::*;
pub use priority_policy::{PriorityAdjustmentPolicy, PriorityLadder};
