//! Observability: exposure accounting, SRM drift checks, metrics and logging.

pub mod drift;
pub mod exposure;
pub mod logging;
pub mod metrics;

pub use drift::{DriftConfig, DriftMonitor, DriftVerdict, ExpectedShares};
pub use exposure::{ExposureCount, ExposureRecorder};
pub use metrics::GatewayMetrics;
