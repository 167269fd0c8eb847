//! Tracing/logging and metrics setup shared by the binaries.

/// Tracing configuration (filters, format).
pub mod tracing;

/// Prometheus recorder and the counters emitted by the service.
pub mod metrics;

pub use self::metrics::{MetricsError, PrometheusHandle};
pub use self::tracing::{LogConfig, LogFormat, ParseLogFormatError};

/// Initialize process-wide tracing/logging.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(config: &LogConfig) {
    self::tracing::init(config);
}
