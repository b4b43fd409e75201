//! Prometheus metrics and structured logging for the dispatch client.
//!
//! - Push connection state, reconnects and event throughput
//! - Per-container failures, sizes and in-flight state
//! - JSON logs in production, pretty logs in development

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, DEFAULT_FILTER};
pub use metrics::Metrics;
