//! Telemetry and logging infrastructure
//!
//! Structured logging with tracing, frame timing and transfer statistics.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogConfig, LogGuard};
pub use metrics::{FrameProfiler, FrameStats, TransferStats};
