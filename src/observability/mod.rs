//! Logging, metrics and call telemetry.
//!
//! - **Logging**: `tracing-subscriber` setup with pretty, JSON or compact output
//! - **Metrics**: counters, histograms and gauges behind [`MetricsCollector`]
//! - **Telemetry**: one structured [`CallRecord`] per guarded call, sent to an
//!   optional [`TelemetrySink`]

mod logging;
mod metrics;
mod telemetry;

pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use metrics::{metric_names, InMemoryMetricsCollector, MetricsCollector, NoopMetricsCollector};
pub use telemetry::{
    CallContext, CallRecord, CallStatus, InMemoryTelemetrySink, TelemetrySink, TokenUsage,
    TracingTelemetrySink,
};
