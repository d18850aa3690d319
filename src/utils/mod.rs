//! # Utility Modules
//!
//! Supporting utilities for logging, metrics, and timing.
//!
//! ## Components
//! - **Logging**: `tracing-subscriber` setup driven by `LoggingConfig`
//! - **Metrics**: Thread-safe session counters
//! - **Timeout**: Async timeout and cancellation wrappers

pub mod logging;
pub mod metrics;
pub mod timeout;

pub use metrics::{Metrics, MetricsSnapshot};
