use rust_decimal::Decimal;
use std::str::FromStr;

/// One decoded account stream message.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountMessage {
    /// Balance position change for one or more assets.
    BalancePosition(BalancePosition),
    /// Any other event type (order updates, balance deltas, ...).
    Other { event_type: String },
}

/// Balance position event.
#[derive(Debug, Clone, PartialEq)]
pub struct BalancePosition {
    /// Exchange event time in ms; the per-asset ordering key.
    pub event_time_ms: u64,
    pub balances: Vec<RawBalance>,
}

/// Per-asset entry with quantities still in wire form.
///
/// Quantities are decoded one asset at a time so a single malformed value
/// only costs that asset's update.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBalance {
    pub asset: String,
    pub free: String,
}

impl RawBalance {
    /// Parse the free quantity.
    pub fn free(&self) -> Result<Decimal, rust_decimal::Error> {
        Decimal::from_str(self.free.trim())
    }
}
