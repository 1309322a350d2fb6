//! Order execution.
//!
//! - **Submission**: [`OrderExecutor`] places market orders sized either by
//!   quote amount (buys) or base quantity (sells) and returns a
//!   [`FillSummary`] with the quantity-weighted fill price
//! - **Watchdog**: an order not filled on acknowledgment is re-checked once
//!   after a delay and cancelled if still open, partially filled or expired
//!
//! Errors from the exchange are returned to the caller as-is. There is no
//! retry at this layer.

mod error;
mod executor;
mod fills;
mod watchdog;

pub use error::ExecutionError;
pub use executor::{generate_client_order_id, ExecutionConfig, OrderExecutor, SharedExecutor};
pub use fills::{weighted_average, FillSummary};
pub use watchdog::{arm_watchdog, WatchdogOutcome};
