//! PartsDesk Observability
//!
//! This crate provides observability features:
//! - Structured logging (tracing-subscriber)
//! - Metrics collection (Prometheus)

pub mod logging;
pub mod metrics;

pub use logging::{LogFormat, LoggingConfig, init_logging};
pub use metrics::Metrics;
