//! Plain data shared between the exchange adapters, the ledger and the strategies.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One candle update for a trading pair.
///
/// Binance pushes the in-progress candle repeatedly; `is_closed` marks the
/// final update of an interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub interval: String,
    pub open_time_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub is_closed: bool,
}

impl Candle {
    /// Relative move within the candle: `close / open - 1`.
    ///
    /// `None` for a zero open price.
    pub fn change_ratio(&self) -> Option<Decimal> {
        if self.open.is_zero() {
            return None;
        }
        Some(self.close / self.open - Decimal::ONE)
    }
}

/// Free quantity of a single asset as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetBalance {
    pub asset: String,
    pub free: Decimal,
}

/// Full account balance snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Exchange-side time the snapshot reflects (ms since epoch).
    pub update_time_ms: u64,
    /// Free quantity per asset. Zero balances may be omitted.
    pub balances: HashMap<String, Decimal>,
}

impl AccountSnapshot {
    /// Build a snapshot keeping only strictly positive balances.
    pub fn from_balances(
        update_time_ms: u64,
        balances: impl IntoIterator<Item = AssetBalance>,
    ) -> Self {
        let balances = balances
            .into_iter()
            .filter(|b| b.free > Decimal::ZERO)
            .map(|b| (b.asset, b.free))
            .collect();
        Self {
            update_time_ms,
            balances,
        }
    }
}

/// A balance transition delivered to ledger subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub asset: String,
    pub old: Decimal,
    pub new: Decimal,
}

impl BalanceChange {
    /// `true` when the balance grew.
    pub fn is_increase(&self) -> bool {
        self.new > self.old
    }

    /// Signed difference `new - old`.
    pub fn delta(&self) -> Decimal {
        self.new - self.old
    }
}
