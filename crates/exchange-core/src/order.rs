//! Order types shared by the execution engine and the exchange adapters.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Convert to Binance string representation.
    pub fn as_binance_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

/// Exchange-reported order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    PendingCancel,
    Rejected,
    Expired,
}

impl OrderStatus {
    /// Convert from Binance string representation.
    pub fn from_binance_str(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(Self::New),
            "PARTIALLY_FILLED" => Some(Self::PartiallyFilled),
            "FILLED" => Some(Self::Filled),
            "CANCELED" => Some(Self::Canceled),
            "PENDING_CANCEL" => Some(Self::PendingCancel),
            "REJECTED" => Some(Self::Rejected),
            "EXPIRED" | "EXPIRED_IN_MATCH" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Statuses the unfilled-order watchdog cancels.
    pub fn needs_cancel(&self) -> bool {
        matches!(self, Self::New | Self::PartiallyFilled | Self::Expired)
    }
}

/// How a market order's size is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sizing {
    /// Spend this much of the quote asset (Binance `quoteOrderQty`).
    Quote(Decimal),
    /// Trade this much of the base asset (Binance `quantity`).
    Base(Decimal),
}

impl Sizing {
    pub fn amount(&self) -> Decimal {
        match self {
            Self::Quote(amount) | Self::Base(amount) => *amount,
        }
    }
}

/// A market order ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub sizing: Sizing,
    /// Locally generated id used to correlate logs with exchange records.
    pub client_order_id: String,
}

/// An execution record returned with the order acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub price: Decimal,
    pub qty: Decimal,
}

/// Exchange acknowledgment of a submitted order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: u64,
    pub status: OrderStatus,
    pub fills: Vec<Fill>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_side_wire_names() {
        assert_eq!(OrderSide::Buy.as_binance_str(), "BUY");
        assert_eq!(OrderSide::Sell.as_binance_str(), "SELL");
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(
            OrderStatus::from_binance_str("PARTIALLY_FILLED"),
            Some(OrderStatus::PartiallyFilled)
        );
        assert_eq!(
            OrderStatus::from_binance_str("EXPIRED_IN_MATCH"),
            Some(OrderStatus::Expired)
        );
        assert_eq!(OrderStatus::from_binance_str("BOGUS"), None);
    }

    #[test]
    fn test_watchdog_statuses() {
        assert!(OrderStatus::New.needs_cancel());
        assert!(OrderStatus::PartiallyFilled.needs_cancel());
        assert!(OrderStatus::Expired.needs_cancel());

        assert!(!OrderStatus::Filled.needs_cancel());
        assert!(!OrderStatus::Canceled.needs_cancel());
        assert!(!OrderStatus::PendingCancel.needs_cancel());
    }

    #[test]
    fn test_sizing_amount() {
        assert_eq!(Sizing::Quote(dec!(25)).amount(), dec!(25));
        assert_eq!(Sizing::Base(dec!(0.3)).amount(), dec!(0.3));
    }
}
