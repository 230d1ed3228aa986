pub mod app;
pub mod metrics_sampler;
pub mod provisioner;
pub mod shutdown;

pub use app::{Application, DispatchReport, LoopTickers};
pub use metrics_sampler::PoolMetricsSampler;
pub use provisioner::LoggingProvisioner;
pub use shutdown::ShutdownManager;
