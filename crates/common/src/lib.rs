//! Shared building blocks used across the workspace.
//!
//! - [`ExponentialBackoff`] / [`BackoffPolicy`]: reconnect pacing for long-lived streams
//! - [`BinanceEnvironment`]: REST and WebSocket endpoints per environment
//! - [`init_logging`]: process-wide tracing subscriber

mod backoff;
mod environment;
mod logging;

pub use backoff::{BackoffPolicy, ExponentialBackoff};
pub use environment::{BinanceEnvironment, ParseEnvironmentError};
pub use logging::{init_logging, LoggingError, LoggingGuard};
