//! 外部协作者接口
//!
//! 所有组件通过构造参数接收这些接口的 `Arc<dyn Trait>` 实现，不依赖任何全局状态。

pub mod clock;
pub mod collaborators;
pub mod ticker;

pub use clock::{Clock, SystemClock};
pub use collaborators::{
    EventSink, MetricsSource, NoopEventSink, WorkerFailureHandler, WorkerProvisioner,
    WorkerReleaser,
};
pub use ticker::{IntervalTicker, Ticker};
