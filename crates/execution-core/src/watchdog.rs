//! Unfilled-order watchdog.
//!
//! A market order that is not filled on acknowledgment gets one delayed
//! status check. If it is still working (or expired with a remainder) it is
//! cancelled. The watchdog never retries and never reports back to the
//! submitter: failures are logged and counted.

use std::sync::Arc;
use std::time::Duration;

use exchange_core::{ExchangeApi, OrderStatus};
use metrics::SharedMetrics;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// What the watchdog did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogOutcome {
    /// The order had settled on its own.
    Settled(OrderStatus),
    Cancelled,
    QueryFailed,
    CancelFailed,
}

/// Spawn a one-shot watchdog for `order_id`. Not cancellable once armed.
pub fn arm_watchdog(
    exchange: Arc<dyn ExchangeApi>,
    symbol: String,
    order_id: u64,
    delay: Duration,
    metrics: SharedMetrics,
) -> JoinHandle<WatchdogOutcome> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        check_and_cancel(exchange.as_ref(), &symbol, order_id, &metrics).await
    })
}

async fn check_and_cancel(
    exchange: &dyn ExchangeApi,
    symbol: &str,
    order_id: u64,
    metrics: &SharedMetrics,
) -> WatchdogOutcome {
    let status = match exchange.query_order(symbol, order_id).await {
        Ok(status) => status,
        Err(e) => {
            warn!(symbol = %symbol, order_id, error = %e, "Watchdog status query failed");
            metrics.inc_watchdog_errors();
            return WatchdogOutcome::QueryFailed;
        }
    };

    if !status.needs_cancel() {
        return WatchdogOutcome::Settled(status);
    }

    match exchange.cancel_order(symbol, order_id).await {
        Ok(()) => {
            info!(symbol = %symbol, order_id, status = ?status, "Watchdog cancelled unfilled order");
            metrics.inc_watchdog_cancels();
            WatchdogOutcome::Cancelled
        }
        Err(e) => {
            warn!(symbol = %symbol, order_id, error = %e, "Watchdog cancel failed");
            metrics.inc_watchdog_errors();
            WatchdogOutcome::CancelFailed
        }
    }
}
