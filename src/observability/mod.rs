//! Observability for the analyst agent
//!
//! Structured logging setup and process-wide counters exposed over HTTP.

pub mod logging;
pub mod metrics;

pub use logging::{init_cli_logging, init_default_logging, init_logging, LogFormat};
pub use metrics::{metrics, InFlightGuard, MetricsCollector, MetricsSnapshot};

// Span macros for structured logging
pub use logging::{llm_span, task_span};
