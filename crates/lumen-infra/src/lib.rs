//! Lumen Infrastructure
//!
//! Process-wide concerns shared by binaries. Currently this is only tracing setup.

pub mod telemetry;

pub use telemetry::{init_telemetry, DEFAULT_LOG_FILTER};
