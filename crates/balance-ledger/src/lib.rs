//! In-memory account balances with per-asset change notifications.
//!
//! The ledger is the single authority on free balances inside the process.
//! The account stream supervisor writes to it, strategies read from it and
//! subscribe to changes of the assets they trade.
//!
//! # Ordering
//!
//! Updates carry the exchange event time. An update is accepted only when its
//! event time is strictly newer than the last accepted one for that asset, so
//! duplicates and late arrivals are dropped silently.
//!
//! Accepted updates are broadcast to the asset's subscribers in registration
//! order. Deliveries are serialized across all writers, so every subscriber
//! sees changes in acceptance order. The balance map lock is released before
//! any delivery starts: readers never wait on a slow subscriber.
//!
//! # Backpressure
//!
//! Subscriber channels are bounded. [`BackpressurePolicy::Block`] makes the
//! writer wait for capacity (a stalled subscriber stalls balance updates);
//! [`BackpressurePolicy::DropNewest`] drops the notification for that
//! subscriber, logs it and counts it instead.

mod ledger;

pub use ledger::{BalanceLedger, SharedLedger, SubscriptionId};

use model::BalanceChange;
use serde::Deserialize;
use tokio::sync::mpsc;

/// Sending half handed to the ledger on subscribe.
pub type BalanceSender = mpsc::Sender<BalanceChange>;
/// Receiving half kept by the subscriber.
pub type BalanceReceiver = mpsc::Receiver<BalanceChange>;

/// Create a bounded notification channel.
pub fn balance_channel(capacity: usize) -> (BalanceSender, BalanceReceiver) {
    mpsc::channel(capacity.max(1))
}

/// What the ledger does when a subscriber's channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Wait for capacity.
    #[default]
    Block,
    /// Skip this notification for the full subscriber.
    DropNewest,
}

/// Ledger settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Capacity of each subscriber channel.
    pub notify_capacity: usize,
    pub backpressure: BackpressurePolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            notify_capacity: 16,
            backpressure: BackpressurePolicy::Block,
        }
    }
}
