//! Fill accounting.

use exchange_core::{Fill, OrderAck, OrderStatus};
use rust_decimal::Decimal;

/// Quantity-weighted average price: `Σ(price × qty) / Σ(qty)`.
///
/// `None` when the fills carry no quantity.
pub fn weighted_average(fills: &[Fill]) -> Option<Decimal> {
    let (notional, qty) = fills
        .iter()
        .fold((Decimal::ZERO, Decimal::ZERO), |(notional, qty), fill| {
            (notional + fill.price * fill.qty, qty + fill.qty)
        });

    if qty.is_zero() {
        None
    } else {
        Some(notional / qty)
    }
}

/// What an order actually did, derived from its acknowledgment.
#[derive(Debug, Clone, PartialEq)]
pub struct FillSummary {
    pub order_id: u64,
    pub status: OrderStatus,
    /// Total base quantity executed.
    pub executed_qty: Decimal,
    /// Total quote amount exchanged.
    pub quote_total: Decimal,
    /// Weighted fill price, if anything filled.
    pub avg_price: Option<Decimal>,
}

impl FillSummary {
    pub fn from_ack(ack: &OrderAck) -> Self {
        let executed_qty: Decimal = ack.fills.iter().map(|f| f.qty).sum();
        let quote_total: Decimal = ack.fills.iter().map(|f| f.price * f.qty).sum();

        Self {
            order_id: ack.order_id,
            status: ack.status,
            executed_qty,
            quote_total,
            avg_price: weighted_average(&ack.fills),
        }
    }

    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }
}
